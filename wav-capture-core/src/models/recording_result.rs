use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::error::CaptureError;
use crate::processing::wav_format::{BITS_PER_SAMPLE, CHANNELS};
use crate::storage::header_finalizer::FinalizeStrategy;

/// Why the capture loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum StopReason {
    UserRequested,
    LowSpace { free_bytes: u64 },
    EndOfStream,
    SizeLimit,
}

impl StopReason {
    /// The soft-stop condition behind this reason, if it was not a normal end.
    pub fn as_error(&self) -> Option<CaptureError> {
        match *self {
            Self::LowSpace { free_bytes } => Some(CaptureError::LowSpace { free_bytes }),
            _ => None,
        }
    }
}

/// Result returned when a capture session completes successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub data_length: u64,
    pub file_length: u64,
    pub duration_secs: f64,
    pub strategy: FinalizeStrategy,
    pub stop_reason: StopReason,
    pub metadata: RecordingMetadata,
}

/// Metadata describing a finished recording.
///
/// Serializable for the optional JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_length: u64,
    pub duration_secs: f64,
    pub finalize_strategy: FinalizeStrategy,
    pub stop_reason: StopReason,
    pub checksum: Option<String>,
}

impl RecordingMetadata {
    /// Creates metadata for a mono 16-bit recording.
    pub fn new_mono(
        file_path: &str,
        sample_rate: u32,
        data_length: u64,
        duration_secs: f64,
        finalize_strategy: FinalizeStrategy,
        stop_reason: StopReason,
        checksum: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            sample_rate,
            channels: CHANNELS,
            bits_per_sample: BITS_PER_SAMPLE,
            data_length,
            duration_secs,
            finalize_strategy,
            stop_reason,
            checksum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_low_space_maps_to_an_error() {
        let err = StopReason::LowSpace { free_bytes: 512 }.as_error().unwrap();
        assert_eq!(err, CaptureError::LowSpace { free_bytes: 512 });
        assert!(err.preserves_data());

        for reason in [StopReason::UserRequested, StopReason::EndOfStream, StopReason::SizeLimit] {
            assert_eq!(reason.as_error(), None);
        }
    }
}
