//! dot - concurrent declarative installer
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Reads a manifest of applications and installs them into a versioned tree
//! under the user's home, linking their executables into a bin directory.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.local/share/dotplug/archives/<name>/   # Downloaded archives
//! ~/.local/opt/<name>/<version>/            # Installed files
//! ~/.local/opt/<name>/current               # Symlink to the active version
//! ~/.local/bin/                             # Symlinks to executables
//! ```

pub mod cmd;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Version reported by `dot --version`.
pub const VERSION: &str = env!("DOTPLUG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "dot")]
#[command(author, version = VERSION, about = "dot - concurrent declarative installer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install every application of a manifest
    Install(InstallArgs),
    /// Validate a manifest and print its install order
    Check {
        /// Manifest file (.toml or .json)
        manifest: PathBuf,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Manifest file (.toml or .json)
    pub manifest: PathBuf,

    /// Number of applications installed concurrently
    #[arg(short, long, env = "DOTPLUG_JOBS")]
    pub jobs: Option<usize>,

    /// Reinstall applications that are already present
    #[arg(short, long)]
    pub force: bool,

    /// Keep running a command block after a command fails
    #[arg(long)]
    pub best_effort: bool,

    /// Give up on an application after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Where downloaded archives are cached
    #[arg(long, value_name = "PATH")]
    pub archive_root: Option<PathBuf>,

    /// Where applications are installed
    #[arg(long, value_name = "PATH")]
    pub install_root: Option<PathBuf>,

    /// Default directory for links
    #[arg(long, value_name = "PATH")]
    pub bin_dir: Option<PathBuf>,

    /// Write command output to build logs in this directory
    #[arg(long, value_name = "PATH", env = "DOTPLUG_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Only print failures and the final summary
    #[arg(short, long)]
    pub quiet: bool,
}
