//! Per-build-kind install actions.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::command::{CommandContext, CommandRunner, TemplateVars};
use crate::config::Config;
use crate::descriptor::AppDescriptor;
use crate::error::InstallError;
use crate::io::extract_blocking;
use crate::reporter::Reporter;
use crate::types::BuildKind;

/// Everything an installer may touch for one application.
pub struct InstallJob<'a> {
    pub app: &'a AppDescriptor,
    pub config: &'a Config,
    /// `<install_root>/<name>/<version>`, already created and empty.
    pub dest: &'a Path,
    /// Cached archive, present for every kind except command.
    pub archive: Option<&'a Path>,
    pub runner: &'a CommandRunner,
    pub vars: &'a TemplateVars,
    pub reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for InstallJob<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallJob")
            .field("app", &self.app.name)
            .field("dest", &self.dest)
            .field("archive", &self.archive)
            .finish_non_exhaustive()
    }
}

impl InstallJob<'_> {
    fn archive(&self) -> Result<&Path, InstallError> {
        self.archive
            .ok_or_else(|| InstallError::context("install", "no archive was acquired"))
    }

    fn archive_type(&self) -> Result<crate::types::ArchiveType, InstallError> {
        self.app.archive_type.ok_or_else(|| {
            InstallError::context("install", format!("{} build without archive type", self.app.build))
        })
    }

    async fn run_commands(&self, base_dir: PathBuf) -> Result<(), InstallError> {
        if self.app.commands.is_empty() {
            return Ok(());
        }
        self.reporter.message(&self.app.name, "running commands");
        let ctx = CommandContext {
            base_dir,
            vars: self.vars.clone(),
        };
        self.runner.run(&self.app.commands, &ctx).await?;
        Ok(())
    }
}

/// The install action of one build kind.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, job: &InstallJob<'_>) -> Result<(), InstallError>;
}

/// Copies a self-contained image to `<dest>/<name>` and marks it executable.
#[derive(Debug)]
pub struct ImageInstaller;

/// Extracts a prebuilt package into the destination.
#[derive(Debug)]
pub struct BinaryInstaller;

/// Extracts sources into a scratch directory and builds them with commands.
#[derive(Debug)]
pub struct SourceInstaller;

/// Runs commands from the configured working directory.
#[derive(Debug)]
pub struct CommandInstaller;

#[async_trait]
impl Installer for ImageInstaller {
    async fn install(&self, job: &InstallJob<'_>) -> Result<(), InstallError> {
        let archive = job.archive()?;
        let target = job.dest.join(&job.app.name);
        tokio::fs::copy(archive, &target)
            .await
            .map_err(|e| InstallError::fs(&target, e))?;
        set_executable(&target).await?;
        debug!(target = %target.display(), "image installed");
        Ok(())
    }
}

#[async_trait]
impl Installer for BinaryInstaller {
    async fn install(&self, job: &InstallJob<'_>) -> Result<(), InstallError> {
        let archive = job.archive()?;
        job.reporter.message(&job.app.name, "extracting");
        let files =
            extract_blocking(archive.to_path_buf(), job.dest.to_path_buf(), job.archive_type()?)
                .await?;
        debug!(files, "binary extracted");
        job.run_commands(job.dest.to_path_buf()).await
    }
}

#[async_trait]
impl Installer for SourceInstaller {
    async fn install(&self, job: &InstallJob<'_>) -> Result<(), InstallError> {
        let archive = job.archive()?;
        let scratch = job.app.scratch_dir(job.config);
        if tokio::fs::try_exists(&scratch)
            .await
            .map_err(|e| InstallError::fs(&scratch, e))?
        {
            tokio::fs::remove_dir_all(&scratch)
                .await
                .map_err(|e| InstallError::fs(&scratch, e))?;
        }

        job.reporter.message(&job.app.name, "extracting sources");
        let files =
            extract_blocking(archive.to_path_buf(), scratch.clone(), job.archive_type()?).await?;
        debug!(files, scratch = %scratch.display(), "sources extracted");
        job.run_commands(scratch).await
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(&self, job: &InstallJob<'_>) -> Result<(), InstallError> {
        job.run_commands(job.config.working_dir.clone()).await
    }
}

/// Select the installer for a build kind.
pub fn get_installer(kind: BuildKind) -> Box<dyn Installer> {
    match kind {
        BuildKind::Image => Box::new(ImageInstaller),
        BuildKind::Binary => Box::new(BinaryInstaller),
        BuildKind::Source => Box::new(SourceInstaller),
        BuildKind::Command => Box::new(CommandInstaller),
    }
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| InstallError::fs(path, e))
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<(), InstallError> {
    Ok(())
}
