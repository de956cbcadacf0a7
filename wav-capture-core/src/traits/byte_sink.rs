use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::CaptureError;

/// Append-only destination for captured PCM bytes.
pub trait ByteSink: Send {
    /// Append `bytes` after everything appended so far.
    fn append(&mut self, bytes: &[u8]) -> Result<(), CaptureError>;

    /// Push buffered bytes to durable storage.
    fn flush(&mut self) -> Result<(), CaptureError>;
}

/// In-memory sink, shareable so a test or preview can inspect the bytes.
impl ByteSink for Arc<Mutex<Vec<u8>>> {
    fn append(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        self.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }
}
