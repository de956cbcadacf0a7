//! # wav-capture-core
//!
//! Streaming mono 16-bit PCM capture to WAV files.
//!
//! Audio is written headerless while recording, because the data length is
//! unknown until the user stops. When recording ends, the 44-byte RIFF header
//! is inserted in front of the data, either by shifting the data in place or
//! by rewriting the file through a temporary copy, depending on free space.
//!
//! ## Architecture
//!
//! ```text
//! wav-capture-core (this crate)
//! ├── traits/       ← AudioSource, ByteSink, CapacityOracle, CaptureDelegate
//! ├── models/       ← CaptureError, SessionState, CaptureConfig, RecordingResult
//! ├── processing/   ← WAV header generation and parsing
//! ├── capture/      ← StreamingCapture (reader + writer threads)
//! ├── monitor/      ← SpaceMonitor (free-space polling)
//! ├── storage/      ← RecordingFile, HeaderFinalizer, metadata sidecar, naming
//! └── session/      ← CaptureSession (orchestrator), RecordingFlag
//! ```

pub mod capture;
pub mod models;
pub mod monitor;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use capture::streaming::{CaptureEnd, CaptureOptions, CaptureOutcome, StreamingCapture};
pub use models::config::{CaptureConfig, StrategyPreference, DEFAULT_LOW_SPACE_THRESHOLD};
pub use models::error::CaptureError;
pub use models::recording_result::{RecordingMetadata, RecordingResult, StopReason};
pub use models::state::SessionState;
pub use monitor::space_monitor::SpaceMonitor;
pub use processing::wav_format::{compute_header, parse_header, WavHeaderInfo, HEADER_LENGTH};
pub use session::capture_session::CaptureSession;
pub use session::signal::RecordingFlag;
pub use storage::header_finalizer::{FinalizeReport, FinalizeStrategy, FinalizerState, HeaderFinalizer};
pub use storage::recording_file::RecordingFile;
pub use traits::audio_source::{AudioSource, ReadOutcome};
pub use traits::byte_sink::ByteSink;
pub use traits::capacity_oracle::CapacityOracle;
pub use traits::capture_delegate::CaptureDelegate;
