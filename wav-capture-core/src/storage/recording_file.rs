use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::traits::byte_sink::ByteSink;

/// Streaming writer for the raw PCM of a recording in progress.
///
/// No header is written while capturing: the file holds headerless PCM until
/// `HeaderFinalizer` inserts the 44-byte header in front of it.
///
/// ## File Format
///
/// ```text
/// while recording:  [raw 16-bit PCM data...]
/// after finalizing: [44-byte WAV header] [raw 16-bit PCM data...]
/// ```
pub struct RecordingFile {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl RecordingFile {
    /// Create (or truncate) the output file.
    ///
    /// Rejects paths without a file name and existing directories with
    /// `InvalidConfig`; any failure to create the parent directory or the file
    /// is `StorageUnavailable`.
    pub fn create(file_path: PathBuf) -> Result<Self, CaptureError> {
        validate_output_path(&file_path)?;

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CaptureError::StorageUnavailable(format!("failed to create directory {}: {}", parent.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file_path)
            .map_err(|e| {
                CaptureError::StorageUnavailable(format!("failed to create {}: {}", file_path.display(), e))
            })?;

        Ok(Self {
            file_path,
            file: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    /// Flush, sync and release the file handle. Returns the data length.
    pub fn close(&mut self) -> Result<u64, CaptureError> {
        if let Some(mut writer) = self.file.take() {
            writer
                .flush()
                .map_err(|e| CaptureError::storage_write("flush failed", e))?;
            let file = writer
                .into_inner()
                .map_err(|e| CaptureError::storage_write("flush failed", e.into_error()))?;
            file.sync_all()
                .map_err(|e| CaptureError::storage_write("sync failed", e))?;
        }
        Ok(self.bytes_written)
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// PCM bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path of the output file.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl ByteSink for RecordingFile {
    fn append(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageWriteError("file is not open".into()))?;
        file.write_all(bytes)
            .map_err(|e| CaptureError::storage_write("write failed", e))?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        match self.file.as_mut() {
            Some(file) => file.flush().map_err(|e| CaptureError::storage_write("flush failed", e)),
            None => Ok(()),
        }
    }
}

/// Reject output paths that can never hold a recording.
pub fn validate_output_path(path: &Path) -> Result<(), CaptureError> {
    if path.file_name().map_or(true, |name| name.is_empty()) {
        return Err(CaptureError::InvalidConfig(format!(
            "output path {} has no file name",
            path.display()
        )));
    }
    if path.is_dir() {
        return Err(CaptureError::InvalidConfig(format!(
            "output path {} is a directory",
            path.display()
        )));
    }
    Ok(())
}

/// Compute SHA-256 hex digest of a file, streaming its contents.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
