use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::config::{StrategyPreference, DEFAULT_LOW_SPACE_THRESHOLD};
use crate::models::error::CaptureError;
use crate::processing::wav_format::{self, HEADER_LENGTH};
use crate::traits::capacity_oracle::CapacityOracle;

/// How the header was put in front of the captured data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizeStrategy {
    /// In-place shift: no extra copy of the data on disk.
    Thrifty,
    /// Copy-rewrite through a temporary file: needs free space for a second copy.
    Wasteful,
}

/// Progress of a single finalization.
///
/// ```text
/// pending → shifting | copying → header_written → done
///     any state → failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    Pending,
    Shifting,
    Copying,
    HeaderWritten,
    Done,
    Failed,
}

/// Summary of a successful finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeReport {
    pub strategy: FinalizeStrategy,
    pub data_length: u64,
    pub file_length: u64,
}

/// Inserts a correct WAV header in front of a headerless PCM file.
///
/// Two strategies trade disk space for safety:
///
/// - **Thrifty** grows the file by `HEADER_LENGTH` bytes and shifts the data
///   towards the end, working backwards from the last block so no unread byte
///   is overwritten, then writes the header at offset 0.
/// - **Wasteful** writes header + data into a sibling temporary file and
///   renames it over the original once the copy is complete.
///
/// The thrifty shift moves blocks of `shift_block_size` bytes. Reading each
/// block fully before writing it `HEADER_LENGTH` bytes further on is safe
/// for any block size, because everything above the block has already been
/// moved. The leading `len % block` bytes left over when the cursor passes
/// offset 0 are moved last.
///
/// If the shift or the header write fails, the moved blocks are copied back
/// and the file is truncated to its raw length, leaving headerless PCM that
/// can be finalized again later.
#[derive(Debug)]
pub struct HeaderFinalizer {
    sample_rate: u32,
    low_space_threshold: u64,
    shift_block_size: usize,
    state: FinalizerState,
}

impl HeaderFinalizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            low_space_threshold: DEFAULT_LOW_SPACE_THRESHOLD,
            shift_block_size: 64 * 1024,
            state: FinalizerState::Pending,
        }
    }

    pub fn with_low_space_threshold(mut self, threshold: u64) -> Self {
        self.low_space_threshold = threshold;
        self
    }

    pub fn with_shift_block_size(mut self, block_size: usize) -> Self {
        self.shift_block_size = block_size.max(1);
        self
    }

    pub fn state(&self) -> FinalizerState {
        self.state
    }

    /// `Wasteful` iff `free > 2 * data_length + HEADER_LENGTH + threshold`.
    pub fn select_strategy(&self, data_length: u64, free_bytes: u64) -> FinalizeStrategy {
        let needed = 2 * data_length as u128 + HEADER_LENGTH as u128 + self.low_space_threshold as u128;
        if free_bytes as u128 > needed {
            FinalizeStrategy::Wasteful
        } else {
            FinalizeStrategy::Thrifty
        }
    }

    /// Finalize `path`, choosing the strategy from `preference` and the free
    /// space reported by `oracle`. If the oracle fails, the thrifty strategy
    /// is used since it needs no extra space.
    pub fn finalize(
        &mut self,
        path: &Path,
        data_length: u64,
        oracle: &dyn CapacityOracle,
        preference: StrategyPreference,
    ) -> Result<FinalizeReport, CaptureError> {
        let strategy = match preference {
            StrategyPreference::Thrifty => FinalizeStrategy::Thrifty,
            StrategyPreference::Wasteful => FinalizeStrategy::Wasteful,
            StrategyPreference::Auto => match oracle.free_bytes() {
                Ok(free) => {
                    let strategy = self.select_strategy(data_length, free);
                    log::debug!(
                        "{} bytes free for {} bytes of data, using {:?} finalization",
                        free,
                        data_length,
                        strategy
                    );
                    strategy
                }
                Err(e) => {
                    log::warn!("Free space unknown ({}), falling back to in-place finalization", e);
                    FinalizeStrategy::Thrifty
                }
            },
        };
        self.finalize_with(path, data_length, strategy)
    }

    /// Finalize `path` with an explicit strategy.
    pub fn finalize_with(
        &mut self,
        path: &Path,
        data_length: u64,
        strategy: FinalizeStrategy,
    ) -> Result<FinalizeReport, CaptureError> {
        if self.state != FinalizerState::Pending {
            return Err(CaptureError::InvalidState(
                "a header finalizer can only run once".into(),
            ));
        }

        let result = self.run(path, data_length, strategy);
        match &result {
            Ok(report) => {
                self.state = FinalizerState::Done;
                log::info!(
                    "Finalized {} ({} data bytes, {:?})",
                    path.display(),
                    report.data_length,
                    report.strategy
                );
            }
            Err(e) => {
                self.state = FinalizerState::Failed;
                log::error!("Failed to finalize {}: {}", path.display(), e);
            }
        }
        result
    }

    fn run(&mut self, path: &Path, data_length: u64, strategy: FinalizeStrategy) -> Result<FinalizeReport, CaptureError> {
        let header = wav_format::compute_header(self.sample_rate, data_length)
            .map_err(|e| CaptureError::FinalizeError(e.to_string()))?;

        let on_disk = fs::metadata(path)
            .map_err(|e| CaptureError::finalize("failed to stat recording", e))?
            .len();
        if on_disk != data_length {
            return Err(CaptureError::FinalizeError(format!(
                "{} holds {} bytes but {} were captured",
                path.display(),
                on_disk,
                data_length
            )));
        }

        match strategy {
            FinalizeStrategy::Thrifty => self.insert_in_place(path, data_length, &header)?,
            FinalizeStrategy::Wasteful => self.copy_rewrite(path, data_length, &header)?,
        }

        Ok(FinalizeReport {
            strategy,
            data_length,
            file_length: data_length + HEADER_LENGTH as u64,
        })
    }

    fn insert_in_place(&mut self, path: &Path, data_length: u64, header: &[u8]) -> Result<(), CaptureError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| CaptureError::finalize("failed to open recording", e))?;

        let shift = HEADER_LENGTH as u64;
        if let Err(e) = file.set_len(data_length + shift) {
            // Nothing has moved yet; restore the raw length.
            let _ = file.set_len(data_length);
            return Err(CaptureError::finalize("failed to extend recording", e));
        }

        self.state = FinalizerState::Shifting;
        if let Err(failure) = shift_forward(&mut file, data_length, shift, self.shift_block_size) {
            restore_raw_length(&file, data_length, failure.restored);
            return Err(CaptureError::finalize("failed while shifting data", failure.error));
        }

        let written = file
            .seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(header))
            .and_then(|_| file.sync_all());
        if let Err(e) = written {
            let restored = undo_shift(&mut file, data_length, shift, 0, self.shift_block_size).is_ok();
            restore_raw_length(&file, data_length, restored);
            return Err(CaptureError::finalize("failed to write header", e));
        }
        self.state = FinalizerState::HeaderWritten;
        Ok(())
    }

    fn copy_rewrite(&mut self, path: &Path, data_length: u64, header: &[u8]) -> Result<(), CaptureError> {
        let temp_path = temp_path_for(path);
        self.state = FinalizerState::Copying;

        match write_with_header(path, &temp_path, header) {
            Ok(written) if written == data_length + HEADER_LENGTH as u64 => {}
            Ok(written) => {
                let _ = fs::remove_file(&temp_path);
                return Err(CaptureError::FinalizeError(format!(
                    "copy wrote {} bytes, expected {}",
                    written,
                    data_length + HEADER_LENGTH as u64
                )));
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(CaptureError::finalize("failed to copy recording", e));
            }
        }
        self.state = FinalizerState::HeaderWritten;

        // rename replaces the original atomically; it is untouched until here
        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(CaptureError::finalize("failed to replace recording", e));
        }
        Ok(())
    }
}

/// Truncate back to the raw data once it is back in place. A file whose
/// data could not be moved back keeps its length so nothing is cut off.
fn restore_raw_length(file: &File, data_length: u64, restored: bool) {
    if !restored {
        log::error!("Recording left partially shifted; raw data could not be restored");
        return;
    }
    match file.set_len(data_length).and_then(|_| file.sync_all()) {
        Ok(()) => log::warn!("Shift abandoned, raw data restored"),
        Err(e) => log::error!("Raw data restored but the file could not be truncated: {}", e),
    }
}

/// A shift that stopped partway. `restored` is true when every byte is back
/// at its original offset; the tail of the file then holds stale bytes.
#[derive(Debug)]
struct ShiftFailure {
    error: io::Error,
    restored: bool,
}

fn read_at<F: Read + Seek>(file: &mut F, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

fn write_at<F: Write + Seek>(file: &mut F, offset: u64, buf: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)
}

/// Move `len` bytes starting at offset 0 to offset `shift`, last block first.
///
/// On failure the blocks already moved are copied back, so the caller gets
/// the raw data at its original offsets whenever the file still accepts
/// writes.
fn shift_forward<F: Read + Write + Seek>(
    file: &mut F,
    len: u64,
    shift: u64,
    block_size: usize,
) -> Result<(), ShiftFailure> {
    let block = block_size as u64;
    let mut buffer = vec![0u8; block_size];

    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(block);
        let chunk = &mut buffer[..(end - start) as usize];

        // [0, end) is untouched and [end, len) sits at [end + shift, len + shift).
        if let Err(error) = read_at(file, start, chunk) {
            let restored = undo_shift(file, len, shift, end, block_size).is_ok();
            return Err(ShiftFailure { error, restored });
        }
        if let Err(error) = write_at(file, start + shift, chunk) {
            // A torn write may have clobbered part of this block in place.
            let restored = write_at(file, start, chunk).is_ok()
                && undo_shift(file, len, shift, end, block_size).is_ok();
            return Err(ShiftFailure { error, restored });
        }

        end = start;
    }
    Ok(())
}

/// Copy `[from + shift, len + shift)` back down to `[from, len)`, first block
/// first, so no byte is overwritten before it has been read.
fn undo_shift<F: Read + Write + Seek>(
    file: &mut F,
    len: u64,
    shift: u64,
    from: u64,
    block_size: usize,
) -> io::Result<()> {
    let mut buffer = vec![0u8; block_size];
    let mut pos = from;
    while pos < len {
        let n = (len - pos).min(block_size as u64) as usize;
        read_at(file, pos + shift, &mut buffer[..n])?;
        write_at(file, pos, &buffer[..n])?;
        pos += n as u64;
    }
    file.flush()
}

/// Write `header` followed by the contents of `source` into `dest`.
fn write_with_header(source: &Path, dest: &Path, header: &[u8]) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(File::create(dest)?);

    writer.write_all(header)?;
    let copied = io::copy(&mut reader, &mut writer)?;

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(header.len() as u64 + copied)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".finalize.tmp");
    path.with_file_name(name)
}
