/// WAV file format utilities.
///
/// Generates and validates the canonical 44-byte RIFF/WAVE header for
/// mono, 16-bit, little-endian PCM. No extension chunks are ever emitted.
use crate::models::error::CaptureError;

/// Size of the canonical WAV RIFF header in bytes.
pub const HEADER_LENGTH: usize = 44;

/// Recordings are always mono.
pub const CHANNELS: u16 = 1;

/// Recordings are always 16-bit signed PCM.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Bytes per sample frame (`channels * bits / 8`).
pub const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;

/// Largest data length whose RIFF chunk size (`data + 36`) still fits in u32.
pub const MAX_DATA_LENGTH: u64 = u32::MAX as u64 - 36;

/// Byte rate for a mono 16-bit stream, or `None` if it overflows u32.
pub fn byte_rate(sample_rate: u32) -> Option<u32> {
    sample_rate.checked_mul(BLOCK_ALIGN as u32)
}

/// Compute the 44-byte WAV header for `data_length` bytes of PCM.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    data_length + 36
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  1 (mono)
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * 2
/// [32-33]  block_align = 2
/// [34-35]  16 (bits per sample)
/// [36-39]  "data"
/// [40-43]  data_length
/// ```
pub fn compute_header(sample_rate: u32, data_length: u64) -> Result<[u8; HEADER_LENGTH], CaptureError> {
    if sample_rate == 0 {
        return Err(CaptureError::InvalidArgument("sample rate must be positive".into()));
    }
    let byte_rate = byte_rate(sample_rate)
        .ok_or_else(|| CaptureError::InvalidArgument(format!("sample rate {} is too large", sample_rate)))?;
    if data_length > MAX_DATA_LENGTH {
        return Err(CaptureError::InvalidArgument(format!(
            "data length {} exceeds the RIFF limit of {} bytes",
            data_length, MAX_DATA_LENGTH
        )));
    }
    let data_size = data_length as u32;
    let chunk_size = data_size + 36;

    let mut header = [0u8; HEADER_LENGTH];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&BLOCK_ALIGN.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    Ok(header)
}

/// Fields decoded from a canonical header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeaderInfo {
    pub riff_length: u32,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_length: u32,
}

impl WavHeaderInfo {
    /// Playback duration implied by the header.
    pub fn duration_secs(&self) -> f64 {
        if self.byte_rate == 0 {
            return 0.0;
        }
        self.data_length as f64 / self.byte_rate as f64
    }
}

/// Decode and validate a canonical mono 16-bit PCM header.
pub fn parse_header(bytes: &[u8]) -> Result<WavHeaderInfo, CaptureError> {
    if bytes.len() < HEADER_LENGTH {
        return Err(CaptureError::InvalidArgument(format!(
            "header needs {} bytes, got {}",
            HEADER_LENGTH,
            bytes.len()
        )));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(CaptureError::InvalidArgument("not a RIFF/WAVE file".into()));
    }
    if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
        return Err(CaptureError::InvalidArgument("unexpected chunk layout".into()));
    }
    if read_u32(bytes, 16) != 16 || read_u16(bytes, 20) != 1 {
        return Err(CaptureError::InvalidArgument("not uncompressed PCM".into()));
    }

    let info = WavHeaderInfo {
        riff_length: read_u32(bytes, 4),
        channels: read_u16(bytes, 22),
        sample_rate: read_u32(bytes, 24),
        byte_rate: read_u32(bytes, 28),
        block_align: read_u16(bytes, 32),
        bits_per_sample: read_u16(bytes, 34),
        data_length: read_u32(bytes, 40),
    };
    if info.channels != CHANNELS || info.bits_per_sample != BITS_PER_SAMPLE {
        return Err(CaptureError::InvalidArgument(format!(
            "unsupported format: {} channel(s), {} bits",
            info.channels, info.bits_per_sample
        )));
    }
    Ok(info)
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}
