//! Archive acquisition: reuse a valid cached archive, otherwise download it.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use super::ArchiveError;
use super::download::DownloadRequest;
use crate::reporter::Reporter;
use crate::types::{AppName, ArchiveType, Version};

/// How `ensure` obtained the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The archive at the path was already present and valid.
    Cached,
    /// The archive was (re)downloaded.
    Downloaded,
}

/// Everything `ensure` needs to know about one archive.
pub struct EnsureRequest<'a> {
    pub client: &'a Client,
    pub name: &'a AppName,
    pub version: &'a Version,
    /// Resolved download URL.
    pub url: &'a str,
    /// Archive path in the cache.
    pub path: &'a Path,
    /// Container format to validate against. `None` skips validation (images).
    pub validate_as: Option<ArchiveType>,
    pub reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for EnsureRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsureRequest")
            .field("name", self.name)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("validate_as", &self.validate_as)
            .finish_non_exhaustive()
    }
}

/// Make sure a valid archive exists at `req.path`.
///
/// A present archive that validates (or any present image) is reused without
/// touching the network. Otherwise one download is attempted, followed by a
/// validation of the fresh file; there are no further retries.
#[instrument(skip_all, fields(app = %req.name))]
pub async fn ensure(req: EnsureRequest<'_>) -> Result<Acquired, ArchiveError> {
    if tokio::fs::try_exists(req.path).await? {
        match req.validate_as {
            None => {
                debug!(path = %req.path.display(), "using cached image");
                return Ok(Acquired::Cached);
            }
            Some(kind) => {
                req.reporter.message(req.name, "validating archive");
                match validate_blocking(req.path.to_path_buf(), kind).await {
                    Ok(files) => {
                        debug!(path = %req.path.display(), files, "cached archive is valid");
                        return Ok(Acquired::Cached);
                    }
                    Err(e) => warn!("cached archive rejected, downloading again: {e}"),
                }
            }
        }
    }

    info!(url = req.url, "fetching archive");
    req.reporter.message(req.name, "downloading");
    DownloadRequest {
        client: req.client,
        name: req.name,
        version: req.version,
        url: req.url,
        dest: req.path,
        reporter: req.reporter,
    }
    .execute()
    .await
    .map_err(|source| ArchiveError::DownloadFailed {
        url: req.url.to_string(),
        source,
    })?;

    if let Some(kind) = req.validate_as {
        validate_blocking(req.path.to_path_buf(), kind).await?;
    }
    Ok(Acquired::Downloaded)
}

async fn validate_blocking(path: PathBuf, kind: ArchiveType) -> Result<usize, ArchiveError> {
    tokio::task::spawn_blocking(move || validate(&path, kind))
        .await
        .map_err(io::Error::other)?
}

/// Read every regular member of the archive to the end.
///
/// Returns the number of regular files. Structural damage, truncated members,
/// CRC mismatches and archives without any file are all reported as
/// [`ArchiveError::Corrupt`].
pub fn validate(path: &Path, kind: ArchiveType) -> Result<usize, ArchiveError> {
    let files = match kind {
        ArchiveType::Tar => validate_tar(path),
        ArchiveType::Zip => validate_zip(path),
    }
    .map_err(|e| ArchiveError::corrupt(path, e))?;

    if files == 0 {
        return Err(ArchiveError::corrupt(path, "archive contains no files"));
    }
    Ok(files)
}

fn validate_tar(path: &Path) -> io::Result<usize> {
    let mut archive = super::open_tar(path)?;
    let mut files = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let expected = entry.size();
        let read = io::copy(&mut entry, &mut io::sink())?;
        if read != expected {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("member truncated ({read} of {expected} bytes)"),
            ));
        }
        files += 1;
    }
    Ok(files)
}

fn validate_zip(path: &Path) -> io::Result<usize> {
    let mut archive = zip::ZipArchive::new(File::open(path)?).map_err(io::Error::other)?;
    let mut files = 0;
    for i in 0..archive.len() {
        let mut member = archive.by_index(i).map_err(io::Error::other)?;
        if member.is_dir() {
            continue;
        }
        // Reading to the end makes the zip reader check the CRC.
        io::copy(&mut member, &mut io::sink())?;
        files += 1;
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fixtures::{tar_bytes, tar_gz_bytes, tar_zst_bytes, write, zip_bytes};
    use crate::reporter::NullReporter;

    const FILES: &[(&str, u32, &[u8])] = &[("foo-1.0/bin/foo", 0o755, b"#!/bin/sh\necho foo\n")];

    #[test]
    fn test_validate_accepts_all_tar_flavours() {
        let dir = tempfile::tempdir().unwrap();
        for (name, bytes) in [
            ("plain.tar", tar_bytes(FILES)),
            ("gz.tar", tar_gz_bytes(FILES)),
            ("zst.tar", tar_zst_bytes(FILES)),
        ] {
            let path = dir.path().join(name);
            write(&path, &bytes);
            assert_eq!(validate(&path, ArchiveType::Tar).unwrap(), 1, "{name}");
        }
    }

    #[test]
    fn test_validate_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        write(&path, &zip_bytes(FILES));
        assert_eq!(validate(&path, ArchiveType::Zip).unwrap(), 1);
    }

    #[test]
    fn test_validate_rejects_truncated_tar() {
        let dir = tempfile::tempdir().unwrap();
        let big = vec![b'x'; 4096];
        let bytes = tar_bytes(&[("a/big", 0o644, &big)]);
        let path = dir.path().join("t.tar");
        write(&path, &bytes[..1024]);
        assert!(matches!(
            validate(&path, ArchiveType::Tar),
            Err(ArchiveError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_truncated_gzip() {
        let dir = tempfile::tempdir().unwrap();
        // Incompressible payload, so cutting the stream in half cuts the member.
        let mut seed: u32 = 0x9e37_79b9;
        let noise: Vec<u8> = (0..65_536)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                (seed >> 24) as u8
            })
            .collect();
        let bytes = tar_gz_bytes(&[("a/noise", 0o644, &noise)]);
        let path = dir.path().join("t.tar");
        write(&path, &bytes[..bytes.len() / 2]);
        assert!(validate(&path, ArchiveType::Tar).is_err());
    }

    #[test]
    fn test_validate_rejects_garbage_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("g.zip");
        write(&garbage, b"<html>not found</html>");
        assert!(matches!(
            validate(&garbage, ArchiveType::Zip),
            Err(ArchiveError::Corrupt { .. })
        ));

        let empty = dir.path().join("e.tar");
        write(&empty, &tar_bytes(&[]));
        assert!(matches!(
            validate(&empty, ArchiveType::Tar),
            Err(ArchiveError::Corrupt { .. })
        ));
    }

    fn request<'a>(
        client: &'a Client,
        name: &'a AppName,
        version: &'a Version,
        url: &'a str,
        path: &'a Path,
        validate_as: Option<ArchiveType>,
    ) -> EnsureRequest<'a> {
        EnsureRequest {
            client,
            name,
            version,
            url,
            path,
            validate_as,
            reporter: &NullReporter,
        }
    }

    #[tokio::test]
    async fn test_valid_cache_is_not_downloaded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/foo-1.0.tar")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo/foo-1.0.tar");
        write(&path, &tar_bytes(FILES));

        let client = Client::new();
        let (name, version) = (AppName::new("foo"), Version::new("1.0"));
        let url = format!("{}/foo-1.0.tar", server.url());
        let acquired = ensure(request(&client, &name, &version, &url, &path, Some(ArchiveType::Tar)))
            .await
            .unwrap();

        assert_eq!(acquired, Acquired::Cached);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_downloaded_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/foo-1.0.zip")
            .with_body(zip_bytes(FILES))
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo/foo-1.0.zip");
        write(&path, b"truncated");

        let client = Client::new();
        let (name, version) = (AppName::new("foo"), Version::new("1.0"));
        let url = format!("{}/foo-1.0.zip", server.url());
        let acquired = ensure(request(&client, &name, &version, &url, &path, Some(ArchiveType::Zip)))
            .await
            .unwrap();

        assert_eq!(acquired, Acquired::Downloaded);
        mock.assert_async().await;
        assert_eq!(validate(&path, ArchiveType::Zip).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_present_image_is_reused_unvalidated() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/img").expect(0).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img/img-1.img");
        write(&path, b"not an archive at all");

        let client = Client::new();
        let (name, version) = (AppName::new("img"), Version::new("1"));
        let url = format!("{}/img", server.url());
        let acquired = ensure(request(&client, &name, &version, &url, &path, None))
            .await
            .unwrap();

        assert_eq!(acquired, Acquired::Cached);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_download_is_corrupt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bad.tar")
            .with_body("this is not a tarball")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad/bad-1.tar");
        let client = Client::new();
        let (name, version) = (AppName::new("bad"), Version::new("1"));
        let url = format!("{}/bad.tar", server.url());
        let err = ensure(request(&client, &name, &version, &url, &path, Some(ArchiveType::Tar)))
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::Corrupt { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_failure_is_download_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gone.tar")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone/gone-1.tar");
        let client = Client::new();
        let (name, version) = (AppName::new("gone"), Version::new("1"));
        let url = format!("{}/gone.tar", server.url());
        let err = ensure(request(&client, &name, &version, &url, &path, Some(ArchiveType::Tar)))
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::DownloadFailed { .. }));
    }
}
