//! Symlink management: bin-directory links and the `current` pointer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Name of the per-application pointer to the active version.
pub const CURRENT: &str = "current";

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is a directory, refusing to replace it with a link", .path.display())]
    Occupied { path: PathBuf },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LinkError + '_ {
    move |source| LinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Point `dest/<target>` at `source_dir/<target>` for every target.
///
/// Existing files and links at the link path are replaced; a real directory
/// there is an error. Targets are not required to exist. Returns the link
/// paths in target order.
pub fn refresh(
    dest: &Path,
    targets: &[String],
    source_dir: &Path,
) -> Result<Vec<PathBuf>, LinkError> {
    fs::create_dir_all(dest).map_err(io_err(dest))?;

    let mut links = Vec::with_capacity(targets.len());
    for target in targets {
        let link = dest.join(target);
        let original = source_dir.join(target);

        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        replace_link(&original, &link)?;
        debug!(link = %link.display(), target = %original.display(), "linked");
        links.push(link);
    }
    Ok(links)
}

/// Replace `<app_root>/current` with a link to `version_dir`.
pub fn update_current(app_root: &Path, version_dir: &Path) -> Result<PathBuf, LinkError> {
    let link = app_root.join(CURRENT);
    replace_link(version_dir, &link)?;
    Ok(link)
}

fn replace_link(original: &Path, link: &Path) -> Result<(), LinkError> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.is_dir() => {
            return Err(LinkError::Occupied {
                path: link.to_path_buf(),
            });
        }
        Ok(_) => fs::remove_file(link).map_err(io_err(link))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(link)(e)),
    }
    symlink(original, link).map_err(io_err(link))
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(_original: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are only supported on unix",
    ))
}
