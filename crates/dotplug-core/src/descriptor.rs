//! Application descriptors as declared in a manifest, plus the paths derived
//! from them.

use crate::config::Config;
use crate::types::{AppName, ArchiveType, BuildKind, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Extension used for image archives that declare no type.
pub const IMAGE_EXTENSION: &str = "img";

/// One application to install. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub name: AppName,
    pub version: Version,
    pub build: BuildKind,
    /// Archive container format. Required for binary and source builds.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub archive_type: Option<ArchiveType>,
    /// Download URL template; `{version}` and `{type}` are substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkSpec>,
    /// Names of applications that must be installed first.
    #[serde(default, alias = "depend", skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<AppName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandBlock>,
    /// Reinstall even when the destination already exists.
    #[serde(default)]
    pub force: bool,
}

/// Where and what to symlink after install.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Link directory; defaults to the configured bin directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    /// Directory the links point into; defaults depend on the build kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

/// An ordered group of shell commands sharing environment, directory and flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandBlock {
    #[serde(default)]
    pub cmds: Vec<String>,
    /// Environment overrides; values may reference `$VAR` / `${VAR}`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory relative to the build's base directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Build flags: `{flag}` in a command becomes the values joined by spaces.
    #[serde(default)]
    pub flags: BTreeMap<String, Vec<String>>,
}

impl AppDescriptor {
    /// Extension of the cached archive file.
    pub fn archive_extension(&self) -> &'static str {
        self.archive_type
            .map_or(IMAGE_EXTENSION, ArchiveType::extension)
    }

    /// `<archive_root>/<name>/<name>-<version>.<type>`, or `None` for command builds.
    pub fn archive_path(&self, config: &Config) -> Option<PathBuf> {
        if !self.build.needs_archive() {
            return None;
        }
        Some(config.archive_root.join(&self.name).join(format!(
            "{}-{}.{}",
            self.name,
            self.version,
            self.archive_extension()
        )))
    }

    /// The repository URL with `{version}` and `{type}` filled in.
    pub fn url(&self) -> Option<String> {
        self.repo.as_ref().map(|repo| {
            repo.replace("{version}", &self.version)
                .replace("{type}", self.archive_extension())
        })
    }

    /// `<install_root>/<name>`.
    pub fn app_root(&self, config: &Config) -> PathBuf {
        config.install_root.join(&self.name)
    }

    /// `<install_root>/<name>/<version>`.
    pub fn install_dest(&self, config: &Config) -> PathBuf {
        self.app_root(config).join(&self.version)
    }

    /// `<install_root>/<name>/current`.
    pub fn current_pointer(&self, config: &Config) -> PathBuf {
        self.app_root(config).join("current")
    }

    /// `<scratch_root>/<name>`.
    pub fn scratch_dir(&self, config: &Config) -> PathBuf {
        config.scratch_root.join(&self.name)
    }

    /// Directory links point into when the `LinkSpec` names no `src`.
    pub fn default_link_source(&self, config: &Config) -> PathBuf {
        let dest = self.install_dest(config);
        match self.build {
            BuildKind::Image | BuildKind::Binary => dest,
            BuildKind::Source | BuildKind::Command => dest.join("bin"),
        }
    }

    /// Directory the links are created in.
    pub fn link_dest(&self, config: &Config) -> PathBuf {
        match self.link.as_ref().and_then(|l| l.dest.as_deref()) {
            Some(raw) => config.expand_path(raw),
            None => config.bin_dir.clone(),
        }
    }
}
