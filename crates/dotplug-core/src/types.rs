//! Shared vocabulary types: names, versions, build kinds and install states.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// The unique name of an application in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppName(String);

impl AppName {
    /// Create a new application name.
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for AppName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for AppName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for AppName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl Borrow<str> for AppName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for AppName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AppName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<&str> for AppName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AppName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A version string, stored verbatim. Only used as a path component and a
/// template value, never compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Create a new version from the given string.
    pub fn new(v: &str) -> Self {
        Self(v.to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for Version {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for Version {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How an application is turned into an install tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    /// Prebuilt self-contained binary image, copied verbatim.
    #[serde(alias = "appimage")]
    Image,
    /// Archived binary package, extracted into the destination.
    Binary,
    /// Source archive built with commands in a scratch directory.
    Source,
    /// Raw command sequence with no archive.
    Command,
}

impl BuildKind {
    /// Whether this kind downloads an archive before installing.
    pub fn needs_archive(self) -> bool {
        !matches!(self, Self::Command)
    }

    /// Whether cached archives of this kind are validated before reuse.
    /// Images are opaque files, so there is nothing to check.
    pub fn validates_archive(self) -> bool {
        matches!(self, Self::Binary | Self::Source)
    }

    /// The manifest spelling of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Binary => "binary",
            Self::Source => "source",
            Self::Command => "command",
        }
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container format of a downloaded archive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// Tar archive, optionally gzip or zstd compressed.
    Tar,
    /// Zip archive.
    Zip,
}

impl ArchiveType {
    /// File extension used for the cached archive.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Per-application install state.
///
/// Variants are declared in pipeline order; a state may only be replaced by
/// one that sorts after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    /// Queued, nothing done yet.
    Pending,
    /// Destination already present and not forced. Terminal.
    AlreadyInstalled,
    /// Destination cleared and ready for installation.
    NotInstalled,
    /// Ensuring the archive is cached and valid.
    Acquiring,
    /// Running the build-kind specific install action.
    Installing,
    /// Refreshing symlinks.
    Linking,
    /// Installed and linked. Terminal.
    Successful,
    /// Some step failed. Terminal.
    Failed,
}

impl InstallState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AlreadyInstalled | Self::Successful | Self::Failed)
    }

    /// Whether dependents may start once this state is reached.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, Self::AlreadyInstalled | Self::Successful)
    }

    /// Whether moving from `self` to `next` keeps the state machine monotonic.
    pub fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        // AlreadyInstalled is a dead end reachable only from Pending.
        if next == Self::AlreadyInstalled {
            return self == Self::Pending;
        }
        next > self
    }

    /// Short lowercase label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AlreadyInstalled => "already installed",
            Self::NotInstalled => "not installed",
            Self::Acquiring => "acquiring",
            Self::Installing => "installing",
            Self::Linking => "linking",
            Self::Successful => "successful",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_only_moves_forward() {
        assert!(InstallState::Pending.can_advance_to(InstallState::NotInstalled));
        assert!(InstallState::NotInstalled.can_advance_to(InstallState::Installing));
        assert!(InstallState::Linking.can_advance_to(InstallState::Failed));
        assert!(!InstallState::Installing.can_advance_to(InstallState::Acquiring));
        assert!(!InstallState::Successful.can_advance_to(InstallState::Failed));
        assert!(!InstallState::NotInstalled.can_advance_to(InstallState::AlreadyInstalled));
    }

    #[test]
    fn test_already_installed_satisfies_dependents() {
        assert!(InstallState::AlreadyInstalled.satisfies_dependents());
        assert!(InstallState::Successful.satisfies_dependents());
        assert!(!InstallState::Failed.satisfies_dependents());
    }

    #[test]
    fn test_build_kind_archive_rules() {
        assert!(BuildKind::Image.needs_archive());
        assert!(!BuildKind::Image.validates_archive());
        assert!(BuildKind::Source.validates_archive());
        assert!(!BuildKind::Command.needs_archive());
    }

    #[test]
    fn test_build_kind_parses_lowercase() {
        let kind: BuildKind = serde_json::from_str("\"binary\"").unwrap();
        assert_eq!(kind, BuildKind::Binary);
        let kind: BuildKind = serde_json::from_str("\"appimage\"").unwrap();
        assert_eq!(kind, BuildKind::Image);
        assert!(serde_json::from_str::<BuildKind>("\"flatpak\"").is_err());
    }
}
