//! Archive extraction.
//!
//! Only regular files are written. The longest leading directory shared by
//! every file is stripped, so `foo-1.0/bin/foo` lands at `<dest>/bin/foo`.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::ArchiveError;
use crate::types::ArchiveType;

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

/// Extract `archive` into `dest`. Returns the number of files written.
pub fn extract(archive: &Path, dest: &Path, kind: ArchiveType) -> Result<usize, ArchiveError> {
    fs::create_dir_all(dest)?;
    let written = match kind {
        ArchiveType::Tar => extract_tar(archive, dest)?,
        ArchiveType::Zip => extract_zip(archive, dest)?,
    };
    debug!(archive = %archive.display(), dest = %dest.display(), written, "extracted");
    Ok(written)
}

/// Run [`extract`] on the blocking pool.
pub async fn extract_blocking(
    archive: PathBuf,
    dest: PathBuf,
    kind: ArchiveType,
) -> Result<usize, ArchiveError> {
    tokio::task::spawn_blocking(move || extract(&archive, &dest, kind))
        .await
        .map_err(io::Error::other)?
}

fn extract_tar(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    // The stream may be compressed, so the member list is gathered in a first
    // pass and the files are written in a second.
    let mut members = Vec::new();
    {
        let mut tar = super::open_tar(archive).map_err(|e| ArchiveError::corrupt(archive, e))?;
        let entries = tar.entries().map_err(|e| ArchiveError::corrupt(archive, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::corrupt(archive, e))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let raw = entry
                .path()
                .map_err(|e| ArchiveError::corrupt(archive, e))?
                .into_owned();
            members.push(sanitize(&raw)?);
        }
    }
    let prefix = common_prefix(&members);

    let mut tar = super::open_tar(archive).map_err(|e| ArchiveError::corrupt(archive, e))?;
    let entries = tar.entries().map_err(|e| ArchiveError::corrupt(archive, e))?;
    let mut written = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiveError::corrupt(archive, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let raw = entry
            .path()
            .map_err(|e| ArchiveError::corrupt(archive, e))?
            .into_owned();
        let target = dest.join(strip(&sanitize(&raw)?, &prefix));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        written += 1;
    }
    Ok(written)
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)
        .map_err(|e| ArchiveError::corrupt(archive, e))?;

    let mut files = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let member = zip
            .by_index_raw(i)
            .map_err(|e| ArchiveError::corrupt(archive, e))?;
        if member.is_dir() || is_symlink(member.unix_mode()) {
            continue;
        }
        files.push((i, sanitize(Path::new(member.name()))?));
    }
    let prefix = common_prefix(files.iter().map(|(_, p)| p));

    for (i, relative) in &files {
        let mut member = zip
            .by_index(*i)
            .map_err(|e| ArchiveError::corrupt(archive, e))?;
        let target = dest.join(strip(relative, &prefix));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut member, &mut out).map_err(|e| ArchiveError::corrupt(archive, e))?;
        make_executable(&target)?;
    }
    Ok(files.len())
}

fn is_symlink(mode: Option<u32>) -> bool {
    mode.is_some_and(|m| m & S_IFMT == S_IFLNK)
}

// Zip archives rarely carry usable permission bits; every file is made
// executable.
#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Normalize a member path, rejecting anything that could escape the
/// destination.
fn sanitize(raw: &Path) -> Result<PathBuf, ArchiveError> {
    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafePath(raw.display().to_string()));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(ArchiveError::UnsafePath(raw.display().to_string()));
    }
    Ok(clean)
}

/// Longest run of leading directory components shared by every member's
/// parent directory.
fn common_prefix<'a>(members: impl IntoIterator<Item = &'a PathBuf>) -> PathBuf {
    let mut prefix: Option<Vec<Component<'a>>> = None;
    for member in members {
        let parent: Vec<Component<'a>> = member
            .parent()
            .map(|p| p.components().collect())
            .unwrap_or_default();
        prefix = Some(match prefix {
            None => parent,
            Some(current) => current
                .into_iter()
                .zip(parent)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    prefix.unwrap_or_default().into_iter().collect()
}

fn strip<'a>(member: &'a Path, prefix: &Path) -> &'a Path {
    member.strip_prefix(prefix).unwrap_or(member)
}
