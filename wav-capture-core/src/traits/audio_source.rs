use crate::models::error::CaptureError;

/// Outcome of a single blocking read from an `AudioSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes of 16-bit little-endian mono PCM were written to the buffer.
    Data(usize),
    /// The source has no more audio to deliver.
    EndOfStream,
}

/// Interface for a platform audio input delivering raw PCM bytes.
///
/// The capture pipeline owns the source exclusively while recording and
/// drives it from a dedicated reader thread, so reads may block.
pub trait AudioSource: Send {
    /// Human-readable name used in log messages.
    fn description(&self) -> String;

    /// Open the source for mono 16-bit capture at `sample_rate`.
    ///
    /// Returns the minimum read buffer size in bytes the platform requires.
    /// Unsupported rates or missing hardware are reported as
    /// `CaptureError::DeviceUnavailable`.
    fn open(&mut self, sample_rate: u32) -> Result<usize, CaptureError>;

    /// Read the next block into `buffer`, blocking until data is available.
    fn read_block(&mut self, buffer: &mut [u8]) -> Result<ReadOutcome, CaptureError>;

    /// Stop capturing and release the device.
    fn close(&mut self) -> Result<(), CaptureError>;
}
