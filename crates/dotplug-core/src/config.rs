//! Run configuration.
//!
//! A `Config` is built once (from the environment, CLI flags, or by hand in
//! tests) and shared read-only by the scheduler and every pipeline. Nothing
//! below this module reads the process environment.

use crate::error::Error;
use dirs::home_dir;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of concurrent workers (and queue capacity).
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Default ceiling on how long a parked application waits before re-enqueueing.
pub const DEFAULT_REQUEUE_BACKOFF: Duration = Duration::from_millis(500);

/// Environment variable overriding the archive root.
pub const ARCHIVE_ROOT_VAR: &str = "DOTPLUG_ARCHIVE_ROOT";
/// Environment variable overriding the install root.
pub const INSTALL_ROOT_VAR: &str = "DOTPLUG_INSTALL_ROOT";
/// Environment variable naming the user's bin directory.
pub const BIN_HOME_VAR: &str = "XDG_BIN_HOME";

/// What happens when a command exits non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandPolicy {
    /// The block fails and the application is marked Failed.
    #[default]
    FailFast,
    /// A warning is logged and the next command runs.
    BestEffort,
}

/// Immutable settings for one install run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding cached archives: `<archive_root>/<name>/<name>-<version>.<type>`.
    pub archive_root: PathBuf,
    /// Directory holding installs: `<install_root>/<name>/<version>`.
    pub install_root: PathBuf,
    /// Link destination used when a `LinkSpec` names none.
    pub bin_dir: PathBuf,
    /// Parent of per-application scratch directories for source builds.
    pub scratch_root: PathBuf,
    /// When set, command output is appended to a per-run build log here.
    pub log_dir: Option<PathBuf>,
    /// Worker count and queue capacity.
    pub concurrency: usize,
    /// Upper bound on a parked application's wait before re-enqueueing.
    pub requeue_backoff: Duration,
    pub command_policy: CommandPolicy,
    /// Per-application wall-clock limit.
    pub app_timeout: Option<Duration>,
    /// Base directory for `command` builds.
    pub working_dir: PathBuf,
    /// Environment handed to every subprocess and used for `$VAR` expansion.
    pub env: BTreeMap<String, String>,
}

impl Config {
    /// Build a configuration with default tunables around the given roots.
    ///
    /// The environment snapshot starts empty; callers that spawn real
    /// commands usually want [`Config::with_env`] or [`Config::from_env`].
    pub fn new(
        archive_root: impl Into<PathBuf>,
        install_root: impl Into<PathBuf>,
        bin_dir: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            archive_root: archive_root.into(),
            install_root: install_root.into(),
            bin_dir: bin_dir.into(),
            scratch_root: scratch_root.into(),
            log_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            requeue_backoff: DEFAULT_REQUEUE_BACKOFF,
            command_policy: CommandPolicy::default(),
            app_timeout: None,
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
        }
    }

    /// Resolve a configuration from the process environment.
    ///
    /// Roots come from `DOTPLUG_ARCHIVE_ROOT`, `DOTPLUG_INSTALL_ROOT` and
    /// `XDG_BIN_HOME`, falling back to `~/.local/share/dotplug/archives`,
    /// `~/.local/opt` and `~/.local/bin`.
    pub fn from_env() -> Result<Self, Error> {
        let env: BTreeMap<String, String> = std::env::vars().collect();
        let working_dir = std::env::current_dir()
            .map_err(|e| Error::Environment(format!("cannot read working directory: {e}")))?;
        Self::resolve(env, home_dir(), working_dir)
    }

    /// Resolution logic behind [`Config::from_env`], with its inputs explicit.
    pub fn resolve(
        env: BTreeMap<String, String>,
        home: Option<PathBuf>,
        working_dir: PathBuf,
    ) -> Result<Self, Error> {
        let pick = |var: &str, fallback: &[&str]| -> Result<PathBuf, Error> {
            if let Some(value) = env.get(var).filter(|v| !v.is_empty()) {
                return Ok(PathBuf::from(value));
            }
            let home = home.as_ref().ok_or_else(|| {
                Error::Environment(format!(
                    "could not determine home directory; set {var} to override"
                ))
            })?;
            Ok(fallback.iter().fold(home.clone(), |p, c| p.join(c)))
        };

        let archive_root = pick(ARCHIVE_ROOT_VAR, &[".local", "share", "dotplug", "archives"])?;
        let install_root = pick(INSTALL_ROOT_VAR, &[".local", "opt"])?;
        let bin_dir = pick(BIN_HOME_VAR, &[".local", "bin"])?;
        let scratch_root = std::env::temp_dir().join("dotplug");

        let mut config = Self::new(archive_root, install_root, bin_dir, scratch_root, working_dir);
        config.env = env;
        Ok(config)
    }

    /// Replace the environment snapshot.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Generate a build log path for an application, if logging is enabled.
    pub fn build_log_path(&self, name: &str, version: &str) -> Option<PathBuf> {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("build-{name}-{version}-{timestamp}.log")))
    }

    /// Expand `$VAR`, `${VAR}` and a leading `~` against the snapshot.
    pub fn expand_path(&self, raw: &str) -> PathBuf {
        let expanded = expand_vars(raw, &self.env);
        expand_tilde(&expanded, self.env.get("HOME").map(Path::new))
    }
}

/// A configuration rooted entirely under `root`, with the caller's `PATH`
/// and `HOME` so commands can run.
#[cfg(test)]
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::new(
        root.join("archives"),
        root.join("opt"),
        root.join("bin"),
        root.join("scratch"),
        root.join("work"),
    );
    for var in ["PATH", "HOME"] {
        if let Ok(value) = std::env::var(var) {
            config.env.insert(var.to_string(), value);
        }
    }
    config.requeue_backoff = Duration::from_millis(20);
    config
}

/// Expand `$VAR` and `${VAR}` references. Unknown variables are left as-is.
pub fn expand_vars(input: &str, env: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(body) = after.strip_prefix('{') {
            if let Some(end) = body.find('}') {
                let var = &body[..end];
                match env.get(var) {
                    Some(value) if is_var_name(var) => out.push_str(value),
                    _ => out.push_str(&rest[pos..pos + 1 + 1 + end + 1]),
                }
                rest = &body[end + 1..];
                continue;
            }
            out.push('$');
            rest = after;
            continue;
        }

        let len = after
            .char_indices()
            .find(|&(i, c)| !(c == '_' || c.is_ascii_alphanumeric()) || (i == 0 && c.is_ascii_digit()))
            .map_or(after.len(), |(i, _)| i);
        let var = &after[..len];
        match env.get(var) {
            Some(value) if !var.is_empty() => out.push_str(value),
            _ => {
                out.push('$');
                out.push_str(var);
            }
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

fn is_var_name(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn expand_tilde(path: &str, home: Option<&Path>) -> PathBuf {
    match (path, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}
