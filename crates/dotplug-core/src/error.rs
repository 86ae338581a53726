use crate::command::CommandError;
use crate::io::ArchiveError;
use crate::link::LinkError;
use crate::manifest::ConfigError;
use crate::types::AppName;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a single application failed. Never escapes its pipeline: it is
/// reported and recorded as the application's Failed outcome.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error("command: {0}")]
    Command(#[from] CommandError),

    #[error("link: {0}")]
    Link(#[from] LinkError),

    #[error("{path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("dependency {0} failed")]
    DependencyFailed(AppName),

    #[error("{context}: {message}")]
    Context {
        context: &'static str,
        message: String,
    },
}

impl InstallError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }

    /// Wrap an IO error with the path it concerns.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Run-level failure: nothing is installed when one of these is returned.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid manifest: {0}")]
    Config(#[from] ConfigError),

    #[error("environment: {0}")]
    Environment(String),
}
