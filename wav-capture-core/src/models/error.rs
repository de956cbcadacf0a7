use std::io;

use thiserror::Error;

/// Errors that can occur while capturing or finalizing a recording.
///
/// I/O causes are carried as strings so the error stays `Clone` and can be
/// stored in `SessionState::Failed` and handed to every waiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio source error: {0}")]
    AudioSourceError(String),

    #[error("storage write error: {0}")]
    StorageWriteError(String),

    /// Soft stop; see `StopReason::as_error`.
    #[error("low on storage space ({free_bytes} bytes free)")]
    LowSpace { free_bytes: u64 },

    #[error("header finalization failed: {0}")]
    FinalizeError(String),

    #[error("out of memory while buffering audio")]
    OutOfMemory,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    pub(crate) fn storage_write(context: &str, err: io::Error) -> Self {
        Self::StorageWriteError(format!("{}: {}", context, err))
    }

    pub(crate) fn finalize(context: &str, err: io::Error) -> Self {
        Self::FinalizeError(format!("{}: {}", context, err))
    }

    /// Whether this error describes a condition under which the captured
    /// data is still intact on disk.
    pub fn preserves_data(&self) -> bool {
        matches!(
            self,
            Self::LowSpace { .. }
                | Self::AudioSourceError(_)
                | Self::StorageWriteError(_)
                | Self::OutOfMemory
                | Self::FinalizeError(_)
        )
    }
}
