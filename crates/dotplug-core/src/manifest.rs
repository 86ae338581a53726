//! Manifest parsing and validation.
//!
//! A manifest is either TOML with an `[[app]]` array of tables, or JSON (when
//! the file extension is `.json`) holding a top-level array of entries. Every
//! check here runs before anything is scheduled: a manifest that fails
//! validation installs nothing.

use crate::descriptor::AppDescriptor;
use crate::types::{AppName, BuildKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported manifest format: {0} (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("invalid TOML manifest: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid application name {0:?}")]
    InvalidName(String),

    #[error("{app} has invalid version {version:?}")]
    InvalidVersion { app: AppName, version: String },

    #[error("application {0} is declared more than once")]
    DuplicateName(AppName),

    #[error("{app} depends on {dependency}, which is not in the manifest")]
    DanglingDependency { app: AppName, dependency: AppName },

    #[error("dependency cycle between: {}", join_names(.0))]
    DependencyCycle(Vec<AppName>),

    #[error("{app} is a {build} build but declares no archive type")]
    MissingArchiveType { app: AppName, build: BuildKind },

    #[error("{app} is a {build} build but declares no repo URL")]
    MissingRepo { app: AppName, build: BuildKind },
}

fn join_names(names: &[AppName]) -> String {
    names
        .iter()
        .map(AppName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A validated list of applications, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "app", default)]
    pub apps: Vec<AppDescriptor>,
}

impl Manifest {
    /// Asynchronously load, parse and validate a manifest file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = Format::from_path(path)?;
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let manifest = match format {
            Format::Toml => Self::from_toml_str(&content)?,
            Format::Json => Self::from_json_str(&content)?,
        };
        tracing::debug!(path = %path.display(), apps = manifest.apps.len(), "loaded manifest");
        Ok(manifest)
    }

    /// Parse and validate a TOML manifest.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let manifest: Manifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate a JSON manifest (a top-level array of entries).
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let apps: Vec<AppDescriptor> = serde_json::from_str(content)?;
        let manifest = Self { apps };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check per-entry rules and the dependency graph.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate(&self.apps).map(|_| ())
    }

    /// Names in an order where every dependency precedes its dependents.
    pub fn install_order(&self) -> Result<Vec<AppName>, ConfigError> {
        validate(&self.apps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") | None => Ok(Self::Toml),
            Some(_) => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Validate descriptors and return a dependency-respecting install order.
///
/// Rejects bad names, duplicates, archived builds missing a type or repo,
/// dependencies on names outside the list, and cycles.
pub fn validate(apps: &[AppDescriptor]) -> Result<Vec<AppName>, ConfigError> {
    let mut seen = HashSet::with_capacity(apps.len());
    for app in apps {
        check_name(&app.name)?;
        check_version(app)?;
        if !seen.insert(&app.name) {
            return Err(ConfigError::DuplicateName(app.name.clone()));
        }
        if matches!(app.build, BuildKind::Binary | BuildKind::Source) && app.archive_type.is_none()
        {
            return Err(ConfigError::MissingArchiveType {
                app: app.name.clone(),
                build: app.build,
            });
        }
        if app.build.needs_archive() && app.repo.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingRepo {
                app: app.name.clone(),
                build: app.build,
            });
        }
    }

    for app in apps {
        for dep in &app.depends {
            if !seen.contains(dep) {
                return Err(ConfigError::DanglingDependency {
                    app: app.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    topological_order(apps)
}

fn check_name(name: &AppName) -> Result<(), ConfigError> {
    let s = name.as_str();
    if s.is_empty() || s == "." || s == ".." || s.contains('/') || s.contains('\0') {
        return Err(ConfigError::InvalidName(s.to_string()));
    }
    Ok(())
}

/// The version is a path component next to the `current` pointer.
fn check_version(app: &AppDescriptor) -> Result<(), ConfigError> {
    let v = app.version.as_str();
    if v.is_empty()
        || v == "."
        || v == ".."
        || v == "current"
        || v.contains('/')
        || v.contains('\0')
    {
        return Err(ConfigError::InvalidVersion {
            app: app.name.clone(),
            version: v.to_string(),
        });
    }
    Ok(())
}

/// Kahn's algorithm over the manifest graph. Ties are broken by manifest
/// position so the order is stable.
fn topological_order(apps: &[AppDescriptor]) -> Result<Vec<AppName>, ConfigError> {
    let position: HashMap<&AppName, usize> =
        apps.iter().enumerate().map(|(i, a)| (&a.name, i)).collect();

    let mut indegree = vec![0usize; apps.len()];
    let mut dependents: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for (i, app) in apps.iter().enumerate() {
        let deps: BTreeSet<usize> = app.depends.iter().map(|d| position[d]).collect();
        indegree[i] = deps.len();
        for dep in deps {
            dependents.entry(dep).or_default().insert(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..apps.len()).filter(|&i| indegree[i] == 0).collect();
    let mut ordered = Vec::with_capacity(apps.len());
    while let Some(i) = ready.pop_first() {
        ordered.push(apps[i].name.clone());
        if let Some(children) = dependents.get(&i) {
            for &child in children {
                indegree[child] -= 1;
                if indegree[child] == 0 {
                    ready.insert(child);
                }
            }
        }
    }

    if ordered.len() != apps.len() {
        let cycle = apps
            .iter()
            .enumerate()
            .filter(|&(i, _)| indegree[i] > 0)
            .map(|(_, a)| a.name.clone())
            .collect();
        return Err(ConfigError::DependencyCycle(cycle));
    }

    Ok(ordered)
}
