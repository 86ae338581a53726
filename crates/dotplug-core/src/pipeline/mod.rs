//! Per-application install state machine.
//!
//! `Pending → NotInstalled → [Acquiring] → Installing → Linking → Successful`,
//! with `AlreadyInstalled` as a short-circuit from `Pending` and `Failed`
//! reachable from any non-terminal state. Errors never leave [`Pipeline::run`];
//! they are reported and recorded in the returned [`Outcome`].

mod installers;

pub use installers::{
    BinaryInstaller, CommandInstaller, ImageInstaller, InstallJob, Installer, SourceInstaller,
    get_installer,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::command::{CommandRunner, TemplateVars};
use crate::config::Config;
use crate::descriptor::AppDescriptor;
use crate::error::InstallError;
use crate::io::{self, EnsureRequest};
use crate::link;
use crate::reporter::Reporter;
use crate::types::{AppName, InstallState, Version};

/// Final result for one application.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub name: AppName,
    pub version: Version,
    pub state: InstallState,
    /// Failure reason when `state` is `Failed`.
    pub error: Option<String>,
}

impl Outcome {
    /// Whether dependents of this application may proceed.
    pub fn is_success(&self) -> bool {
        self.state.satisfies_dependents()
    }
}

/// Drives one application from `Pending` to a terminal state.
pub struct Pipeline {
    app: Arc<AppDescriptor>,
    config: Arc<Config>,
    client: Client,
    reporter: Arc<dyn Reporter>,
    state: InstallState,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("app", &self.app.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        app: Arc<AppDescriptor>,
        config: Arc<Config>,
        client: Client,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            app,
            config,
            client,
            reporter,
            state: InstallState::Pending,
        }
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Run to a terminal state, honouring the configured per-app timeout.
    #[instrument(skip(self), fields(app = %self.app.name, version = %self.app.version))]
    pub async fn run(mut self) -> Outcome {
        let result = match self.config.app_timeout {
            Some(limit) => tokio::time::timeout(limit, self.drive())
                .await
                .unwrap_or(Err(InstallError::TimedOut(limit))),
            None => self.drive().await,
        };

        match result {
            Ok(()) => self.outcome(None),
            Err(e) => {
                let reason = e.to_string();
                warn!("install failed: {reason}");
                self.discard_empty_dest().await;
                self.advance(InstallState::Failed);
                self.reporter
                    .failed(&self.app.name, &self.app.version, &reason);
                self.outcome(Some(reason))
            }
        }
    }

    async fn drive(&mut self) -> Result<(), InstallError> {
        let app = Arc::clone(&self.app);
        let config = Arc::clone(&self.config);
        let dest = app.install_dest(&config);

        if self.prepare_dest(&dest).await? {
            self.advance(InstallState::AlreadyInstalled);
            self.reporter.message(&app.name, "already installed");
            self.reporter
                .done(&app.name, &app.version, "already installed", None);
            return Ok(());
        }
        self.advance(InstallState::NotInstalled);

        let archive = match app.archive_path(&config) {
            Some(path) => {
                self.advance(InstallState::Acquiring);
                self.acquire(&path).await?;
                Some(path)
            }
            None => None,
        };

        self.advance(InstallState::Installing);
        let vars = TemplateVars::for_app(&app, &config);
        let runner = CommandRunner::new(&config)
            .with_log(config.build_log_path(&app.name, &app.version));
        let job = InstallJob {
            app: &app,
            config: &config,
            dest: &dest,
            archive: archive.as_deref(),
            runner: &runner,
            vars: &vars,
            reporter: &*self.reporter,
        };
        get_installer(app.build).install(&job).await?;

        self.advance(InstallState::Linking);
        if let Some(spec) = &app.link {
            let source = match &spec.src {
                Some(raw) => config.expand_path(&vars.render(raw)?),
                None => app.default_link_source(&config),
            };
            self.reporter.message(&app.name, "creating symlinks");
            let links = link::refresh(&app.link_dest(&config), &spec.targets, &source)?;
            debug!(count = links.len(), "links refreshed");
        }
        link::update_current(&app.app_root(&config), &dest)?;

        let size = dir_size(dest).await;
        self.advance(InstallState::Successful);
        info!("installed");
        self.reporter.done(&app.name, &app.version, "installed", size);
        Ok(())
    }

    /// Returns `true` when the destination exists and `force` is unset.
    /// Otherwise clears it (when forced) and creates it empty.
    async fn prepare_dest(&self, dest: &Path) -> Result<bool, InstallError> {
        let exists = tokio::fs::try_exists(dest)
            .await
            .map_err(|e| InstallError::fs(dest, e))?;
        if exists {
            if !self.app.force {
                return Ok(true);
            }
            debug!(dest = %dest.display(), "forced reinstall, removing");
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|e| InstallError::fs(dest, e))?;
        }
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| InstallError::fs(dest, e))?;
        Ok(false)
    }

    async fn acquire(&self, path: &Path) -> Result<(), InstallError> {
        let url = self
            .app
            .url()
            .ok_or_else(|| InstallError::context("acquire", "no repo URL"))?;
        let validate_as = if self.app.build.validates_archive() {
            self.app.archive_type
        } else {
            None
        };
        let acquired = io::ensure(EnsureRequest {
            client: &self.client,
            name: &self.app.name,
            version: &self.app.version,
            url: &url,
            path,
            validate_as,
            reporter: &*self.reporter,
        })
        .await?;
        debug!(?acquired, "archive ready");
        Ok(())
    }

    /// Drops the destination created by `prepare_dest` when nothing has been
    /// installed into it yet. Once Installing has started its effects stay.
    async fn discard_empty_dest(&self) {
        if !matches!(
            self.state,
            InstallState::NotInstalled | InstallState::Acquiring
        ) {
            return;
        }
        let dest = self.app.install_dest(&self.config);
        if let Err(e) = tokio::fs::remove_dir(&dest).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove {}: {e}", dest.display());
            }
        }
    }

    fn advance(&mut self, next: InstallState) {
        if !self.state.can_advance_to(next) {
            debug_assert!(false, "illegal transition {} -> {}", self.state, next);
            return;
        }
        let from = std::mem::replace(&mut self.state, next);
        self.reporter
            .transition(&self.app.name, &self.app.version, from, next);
    }

    fn outcome(&self, error: Option<String>) -> Outcome {
        Outcome {
            name: self.app.name.clone(),
            version: self.app.version.clone(),
            state: self.state,
            error,
        }
    }
}

async fn dir_size(path: PathBuf) -> Option<u64> {
    tokio::task::spawn_blocking(move || calculate_dir_size(&path))
        .await
        .ok()
}

fn calculate_dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .flatten()
        .filter_map(|e| e.metadata().ok())
        .filter(std::fs::Metadata::is_file)
        .map(|m| m.len())
        .sum()
}
