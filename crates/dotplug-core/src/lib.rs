//! dotplug - declarative application installer
//!
//! Installs a manifest of applications concurrently into a versioned tree:
//!
//! ```text
//! <archive_root>/<name>/<name>-<version>.<type>   cached downloads
//! <install_root>/<name>/<version>/                installed files
//! <install_root>/<name>/current -> <version>      active version
//! <bin_dir>/<target> -> <install_root>/...         user-facing links
//! ```
//!
//! The [`Scheduler`] admits every [`AppDescriptor`] into a bounded worker
//! pool and only starts an application once its dependencies are installed.
//! Each application is driven by a [`Pipeline`] through the
//! [`InstallState`] machine. Progress goes to a [`Reporter`].

pub mod command;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod io;
pub mod link;
pub mod manifest;
pub mod pipeline;
pub mod reporter;
pub mod scheduler;
pub mod types;

pub use config::{CommandPolicy, Config};
pub use descriptor::{AppDescriptor, CommandBlock, LinkSpec};
pub use error::{Error, InstallError};
pub use io::download::USER_AGENT;
pub use manifest::{ConfigError, Manifest};
pub use pipeline::{Outcome, Pipeline};
pub use reporter::{NullReporter, Reporter};
pub use scheduler::{RunReport, Scheduler};
pub use types::{AppName, ArchiveType, BuildKind, InstallState, Version};
