//! Archive engine: download, validate and extract application archives.

pub mod archive;
pub mod download;
pub mod extract;

pub use archive::{Acquired, EnsureRequest, ensure, validate};
pub use download::{DownloadError, DownloadRequest};
pub use extract::{extract, extract_blocking};

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("download of {url} failed: {source}")]
    DownloadFailed {
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error("{} is not a valid archive: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("unsafe member path in archive: {0}")]
    UnsafePath(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    pub(crate) fn corrupt(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Open a tar stream, transparently decompressing gzip or zstd by magic bytes.
pub(crate) fn open_tar(path: &Path) -> io::Result<tar::Archive<Box<dyn Read>>> {
    let mut magic = [0u8; 4];
    let read = {
        let mut file = File::open(path)?;
        read_prefix(&mut file, &mut magic)?
    };
    let head = &magic[..read];

    let reader = BufReader::new(File::open(path)?);
    let stream: Box<dyn Read> = if head.starts_with(&GZIP_MAGIC) {
        Box::new(flate2::read::GzDecoder::new(reader))
    } else if head.starts_with(&ZSTD_MAGIC) {
        Box::new(zstd::stream::Decoder::with_buffer(reader)?)
    } else {
        Box::new(reader)
    };

    let mut archive = tar::Archive::new(stream);
    archive.set_preserve_permissions(true);
    Ok(archive)
}

fn read_prefix(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Archive builders shared by the io and pipeline tests.

    use std::io::Write;
    use std::path::Path;

    /// Regular file entries as `(path, mode, contents)`.
    pub(crate) type Entry<'a> = (&'a str, u32, &'a [u8]);

    pub(crate) fn tar_bytes(entries: &[Entry<'_>]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, mode, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    pub(crate) fn tar_gz_bytes(entries: &[Entry<'_>]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes(entries)).unwrap();
        encoder.finish().unwrap()
    }

    pub(crate) fn tar_zst_bytes(entries: &[Entry<'_>]) -> Vec<u8> {
        zstd::stream::encode_all(tar_bytes(entries).as_slice(), 0).unwrap()
    }

    pub(crate) fn zip_bytes(entries: &[Entry<'_>]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (path, mode, data) in entries {
            let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
            writer.start_file(*path, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub(crate) fn write(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }
}
