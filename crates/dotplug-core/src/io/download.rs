//! Streaming archive downloads with progress reporting.
//!
//! Bytes land in `<dest>.part` first and are renamed over `dest` only once the
//! body has been fully written, so an interrupted download never leaves a
//! truncated file at the archive path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::reporter::Reporter;
use crate::types::{AppName, Version};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("dotplug/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request for a download operation
pub struct DownloadRequest<'a> {
    pub client: &'a Client,
    pub name: &'a AppName,
    pub version: &'a Version,
    pub url: &'a str,
    pub dest: &'a Path,
    pub reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for DownloadRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("name", self.name)
            .field("version", self.version)
            .field("url", &self.url)
            .field("dest", &self.dest)
            .finish_non_exhaustive()
    }
}

impl DownloadRequest<'_> {
    /// Stream the body to disk. Returns the number of bytes written.
    pub async fn execute(self) -> Result<u64, DownloadError> {
        let part = part_path(self.dest);
        let result = self.stream_to(&part).await;
        match result {
            Ok(written) => {
                fs::rename(&part, self.dest).await?;
                Ok(written)
            }
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn stream_to(&self, part: &Path) -> Result<u64, DownloadError> {
        if let Some(parent) = part.parent() {
            fs::create_dir_all(parent).await?;
        }

        let resp = self
            .client
            .get(self.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?
            .error_for_status()?;

        let total = resp.content_length();
        debug!(url = self.url, ?total, "downloading");
        self.reporter
            .downloading(self.name, self.version, 0, total);

        let mut file = File::create(part).await?;
        let mut stream = resp.bytes_stream();
        let mut received: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            self.reporter
                .downloading(self.name, self.version, received, total);
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(received)
    }
}

/// `<dest>.part`
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}
