use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::processing::wav_format::{self, BLOCK_ALIGN, MAX_DATA_LENGTH};

/// Free-space floor below which recording is stopped (5 MiB).
pub const DEFAULT_LOW_SPACE_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Which header finalization strategy to use when recording stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyPreference {
    /// Pick by free space: copy-rewrite when there is plenty, shift otherwise.
    #[default]
    Auto,
    /// Always shift the data in place.
    Thrifty,
    /// Always rewrite through a temporary file.
    Wasteful,
}

/// Configuration for a capture session.
///
/// Channel count and bit depth are fixed (mono, 16-bit); only the sample
/// rate and the pipeline tunables vary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sample rate in Hz (default: 8000).
    pub sample_rate: u32,

    /// Bytes per capture block. `None` uses twice the source's minimum buffer.
    pub block_size: Option<usize>,

    /// Maximum recording duration in seconds (None = until stopped).
    pub max_duration_secs: Option<f64>,

    /// Free-space poll interval in milliseconds (default: 3000).
    pub poll_interval_ms: u64,

    /// Free bytes below which the session stops itself (default: 5 MiB).
    pub low_space_threshold: u64,

    /// Number of blocks that may be in flight between reader and writer.
    pub pipeline_depth: usize,

    /// Finalization strategy selection.
    pub finalize_strategy: StrategyPreference,

    /// Block size used when shifting data in place (default: 64 KiB).
    pub shift_block_size: usize,

    /// Write a `.metadata.json` sidecar next to the recording.
    pub write_metadata: bool,
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if wav_format::byte_rate(self.sample_rate).is_none() {
            return Err(format!("sample rate {} is too large", self.sample_rate));
        }
        if let Some(block_size) = self.block_size {
            if block_size == 0 || block_size % BLOCK_ALIGN as usize != 0 {
                return Err(format!(
                    "block size must be a positive multiple of {} bytes, got {}",
                    BLOCK_ALIGN, block_size
                ));
            }
        }
        if let Some(max) = self.max_duration_secs {
            if !max.is_finite() || max <= 0.0 {
                return Err(format!("max duration must be positive, got {}", max));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err("poll interval must be positive".into());
        }
        if self.pipeline_depth == 0 {
            return Err("pipeline depth must be at least 1".into());
        }
        if self.shift_block_size == 0 {
            return Err("shift block size must be positive".into());
        }
        Ok(())
    }

    /// `sample_rate * bits/8 * channels`.
    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * BLOCK_ALIGN as u64
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Block size to read with, given the minimum the source reported.
    pub fn effective_block_size(&self, source_min_buffer: usize) -> usize {
        match self.block_size {
            Some(size) => size,
            // twice the minimum is always a whole number of 2-byte frames
            None => source_min_buffer.max(1).saturating_mul(2),
        }
    }

    /// Largest number of PCM bytes a session may capture, bounded by the
    /// RIFF size fields and by `max_duration_secs`, in whole frames.
    pub fn max_data_length(&self) -> u64 {
        let riff_limit = MAX_DATA_LENGTH - MAX_DATA_LENGTH % BLOCK_ALIGN as u64;
        match self.max_duration_secs {
            Some(secs) => {
                let bytes = (secs * self.bytes_per_second() as f64) as u64;
                (bytes - bytes % BLOCK_ALIGN as u64).min(riff_limit)
            }
            None => riff_limit,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            block_size: None,
            max_duration_secs: None,
            poll_interval_ms: 3000,
            low_space_threshold: DEFAULT_LOW_SPACE_THRESHOLD,
            pipeline_depth: 8,
            finalize_strategy: StrategyPreference::Auto,
            shift_block_size: 64 * 1024,
            write_metadata: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.low_space_threshold, 5_242_880);
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.bytes_per_second(), 16000);
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            CaptureConfig { sample_rate: 0, ..Default::default() },
            CaptureConfig { sample_rate: u32::MAX, ..Default::default() },
            CaptureConfig { block_size: Some(0), ..Default::default() },
            CaptureConfig { block_size: Some(3), ..Default::default() },
            CaptureConfig { max_duration_secs: Some(-1.0), ..Default::default() },
            CaptureConfig { poll_interval_ms: 0, ..Default::default() },
            CaptureConfig { pipeline_depth: 0, ..Default::default() },
            CaptureConfig { shift_block_size: 0, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn block_size_defaults_to_twice_source_minimum() {
        let config = CaptureConfig::default();
        assert_eq!(config.effective_block_size(640), 1280);
        assert_eq!(config.effective_block_size(0), 2);

        let fixed = CaptureConfig { block_size: Some(4096), ..Default::default() };
        assert_eq!(fixed.effective_block_size(640), 4096);
    }

    #[test]
    fn max_data_length_honours_duration() {
        let config = CaptureConfig {
            sample_rate: 8000,
            max_duration_secs: Some(1.5),
            ..Default::default()
        };
        assert_eq!(config.max_data_length(), 24000);

        let unlimited = CaptureConfig::default();
        assert!(unlimited.max_data_length() <= MAX_DATA_LENGTH);
        assert_eq!(unlimited.max_data_length() % 2, 0);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: CaptureConfig =
            serde_json::from_str(r#"{"sample_rate": 44100, "finalize_strategy": "thrifty"}"#).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.finalize_strategy, StrategyPreference::Thrifty);
        assert_eq!(config.poll_interval_ms, 3000);
    }
}
