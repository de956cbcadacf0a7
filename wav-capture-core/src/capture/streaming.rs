use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use crate::models::error::CaptureError;
use crate::session::signal::RecordingFlag;
use crate::traits::audio_source::{AudioSource, ReadOutcome};
use crate::traits::byte_sink::ByteSink;

/// Parameters for one capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Bytes requested from the source per read.
    pub block_size: usize,
    /// Blocks that may be queued between reader and writer.
    pub pipeline_depth: usize,
    /// Capture stops once this many bytes have been read.
    pub max_bytes: u64,
}

/// How the capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The recording flag was cleared.
    Stopped,
    /// The source reported end of stream.
    EndOfStream,
    /// `max_bytes` was reached.
    SizeLimit,
    Failed(CaptureError),
}

/// Everything handed back once both capture threads have exited.
pub struct CaptureOutcome<S, K> {
    pub source: S,
    pub sink: K,
    pub bytes_written: u64,
    pub end: CaptureEnd,
}

/// Drives the read/append loop from an `AudioSource` into a `ByteSink`.
///
/// Reading and persisting run on separate threads joined by a bounded
/// channel so a slow disk does not stall the audio input (and vice versa).
/// Blocks travel through the channel in read order and are appended in that
/// order. The reader checks the shared flag once per block; a block that has
/// been read is always appended whole.
/// ```text
/// [AudioSource] → audio-capture → [channel] → audio-writer → [ByteSink]
/// ```
pub struct StreamingCapture<S, K> {
    flag: Arc<RecordingFlag>,
    bytes_written: Arc<AtomicU64>,
    reader: thread::JoinHandle<(S, CaptureEnd)>,
    writer: thread::JoinHandle<(K, Option<CaptureError>)>,
}

impl<S, K> StreamingCapture<S, K>
where
    S: AudioSource + 'static,
    K: ByteSink + 'static,
{
    /// Spawn the reader and writer threads. The source must already be open.
    pub fn start(source: S, sink: K, options: CaptureOptions, flag: Arc<RecordingFlag>) -> Result<Self, CaptureError> {
        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(options.pipeline_depth.max(1));
        let bytes_written = Arc::new(AtomicU64::new(0));

        let writer = {
            let bytes_written = Arc::clone(&bytes_written);
            thread::Builder::new()
                .name("audio-writer".into())
                .spawn(move || write_loop(sink, rx, &bytes_written))
                .map_err(|e| CaptureError::Unknown(format!("failed to spawn writer thread: {}", e)))?
        };

        // If this spawn fails the sender is dropped and the writer exits on its own.
        let reader = {
            let flag = Arc::clone(&flag);
            thread::Builder::new()
                .name("audio-capture".into())
                .spawn(move || read_loop(source, tx, &flag, options))
                .map_err(|e| CaptureError::Unknown(format!("failed to spawn capture thread: {}", e)))?
        };

        Ok(Self {
            flag,
            bytes_written,
            reader,
            writer,
        })
    }

    /// Ask the reader to stop after the block it is currently reading.
    pub fn request_stop(&self) {
        self.flag.request_stop();
    }

    /// Bytes appended to the sink so far. Never decreases.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    /// Shared handle on the written-bytes counter, for progress reporting.
    pub fn bytes_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_written)
    }

    /// Wait for both threads to exit and take back the source and sink.
    ///
    /// Sink errors take precedence over how the reader ended: they mean the
    /// file is short of what was read.
    pub fn join(self) -> Result<CaptureOutcome<S, K>, CaptureError> {
        let (source, read_end) = self
            .reader
            .join()
            .map_err(|_| CaptureError::AudioSourceError("capture thread panicked".into()))?;
        let (sink, write_error) = self
            .writer
            .join()
            .map_err(|_| CaptureError::StorageWriteError("writer thread panicked".into()))?;

        let end = match write_error {
            Some(e) => CaptureEnd::Failed(e),
            None => read_end,
        };

        Ok(CaptureOutcome {
            source,
            sink,
            bytes_written: self.bytes_written.load(Ordering::SeqCst),
            end,
        })
    }
}

fn read_loop<S: AudioSource>(
    mut source: S,
    tx: SyncSender<Vec<u8>>,
    flag: &RecordingFlag,
    options: CaptureOptions,
) -> (S, CaptureEnd) {
    log::debug!("Capture started from {}", source.description());
    let mut bytes_read: u64 = 0;

    let end = loop {
        if !flag.is_recording() {
            break CaptureEnd::Stopped;
        }
        if bytes_read >= options.max_bytes {
            break CaptureEnd::SizeLimit;
        }

        let mut block = Vec::new();
        if block.try_reserve_exact(options.block_size).is_err() {
            break CaptureEnd::Failed(CaptureError::OutOfMemory);
        }
        block.resize(options.block_size, 0);

        let count = match source.read_block(&mut block) {
            Ok(ReadOutcome::Data(count)) => count.min(block.len()),
            Ok(ReadOutcome::EndOfStream) => break CaptureEnd::EndOfStream,
            Err(e) => break CaptureEnd::Failed(classify_source_error(e)),
        };
        if count == 0 {
            continue;
        }

        let remaining = options.max_bytes - bytes_read;
        block.truncate((count as u64).min(remaining) as usize);
        bytes_read += block.len() as u64;

        if tx.send(block).is_err() {
            // The writer has failed; it reports its own error.
            break CaptureEnd::Stopped;
        }
    };

    if let Err(e) = source.close() {
        log::warn!("Failed to close {}: {}", source.description(), e);
    }
    log::debug!("Capture loop exited after {} bytes: {:?}", bytes_read, end);
    (source, end)
}

fn write_loop<K: ByteSink>(mut sink: K, rx: Receiver<Vec<u8>>, bytes_written: &AtomicU64) -> (K, Option<CaptureError>) {
    for block in rx.iter() {
        if let Err(e) = sink.append(&block) {
            log::error!("Failed to write audio data: {}", e);
            return (sink, Some(e));
        }
        bytes_written.fetch_add(block.len() as u64, Ordering::SeqCst);
    }

    let error = sink.flush().err();
    (sink, error)
}

/// Sources report their own failures; keep them in the audio taxonomy.
fn classify_source_error(error: CaptureError) -> CaptureError {
    match error {
        CaptureError::AudioSourceError(_) | CaptureError::DeviceUnavailable(_) | CaptureError::OutOfMemory => error,
        other => CaptureError::AudioSourceError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Source returning scripted reads; blocks are filled with their index.
    struct ScriptedSource {
        reads: VecDeque<Result<ReadOutcome, CaptureError>>,
        block_index: u8,
        closed: bool,
    }

    impl ScriptedSource {
        fn blocks(count: usize, size: usize) -> Self {
            Self {
                reads: (0..count).map(|_| Ok(ReadOutcome::Data(size))).collect(),
                block_index: 0,
                closed: false,
            }
        }

        fn then(mut self, outcome: Result<ReadOutcome, CaptureError>) -> Self {
            self.reads.push_back(outcome);
            self
        }
    }

    impl AudioSource for ScriptedSource {
        fn description(&self) -> String {
            "scripted".into()
        }

        fn open(&mut self, _sample_rate: u32) -> Result<usize, CaptureError> {
            Ok(8)
        }

        fn read_block(&mut self, buffer: &mut [u8]) -> Result<ReadOutcome, CaptureError> {
            let outcome = self.reads.pop_front().unwrap_or(Ok(ReadOutcome::EndOfStream));
            if let Ok(ReadOutcome::Data(n)) = outcome {
                self.block_index += 1;
                buffer[..n].iter_mut().for_each(|b| *b = self.block_index);
            }
            outcome
        }

        fn close(&mut self) -> Result<(), CaptureError> {
            self.closed = true;
            Ok(())
        }
    }

    struct FailingSink {
        accepted: usize,
    }

    impl ByteSink for FailingSink {
        fn append(&mut self, _bytes: &[u8]) -> Result<(), CaptureError> {
            if self.accepted == 0 {
                return Err(CaptureError::StorageWriteError("disk full".into()));
            }
            self.accepted -= 1;
            Ok(())
        }

        fn flush(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    fn options(block_size: usize) -> CaptureOptions {
        CaptureOptions {
            block_size,
            pipeline_depth: 2,
            max_bytes: u64::MAX,
        }
    }

    #[test]
    fn writes_blocks_in_read_order_until_end_of_stream() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let capture = StreamingCapture::start(
            ScriptedSource::blocks(5, 4),
            Arc::clone(&sink),
            options(4),
            Arc::new(RecordingFlag::new()),
        )
        .unwrap();

        let outcome = capture.join().unwrap();
        assert_eq!(outcome.end, CaptureEnd::EndOfStream);
        assert_eq!(outcome.bytes_written, 20);
        assert!(outcome.source.closed);

        let expected: Vec<u8> = (1..=5u8).flat_map(|i| [i; 4]).collect();
        assert_eq!(*sink.lock(), expected);
    }

    #[test]
    fn partial_reads_append_only_bytes_read() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let source = ScriptedSource::blocks(1, 4).then(Ok(ReadOutcome::Data(2))).then(Ok(ReadOutcome::Data(0)));
        let capture = StreamingCapture::start(source, Arc::clone(&sink), options(4), Arc::new(RecordingFlag::new())).unwrap();

        let outcome = capture.join().unwrap();
        assert_eq!(outcome.bytes_written, 6);
        assert_eq!(*sink.lock(), vec![1, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn stop_before_first_read_writes_nothing() {
        let flag = Arc::new(RecordingFlag::new());
        flag.request_stop();
        let capture = StreamingCapture::start(
            ScriptedSource::blocks(3, 4),
            Arc::new(Mutex::new(Vec::new())),
            options(4),
            flag,
        )
        .unwrap();

        let outcome = capture.join().unwrap();
        assert_eq!(outcome.end, CaptureEnd::Stopped);
        assert_eq!(outcome.bytes_written, 0);
    }

    #[test]
    fn source_error_keeps_earlier_blocks() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let source = ScriptedSource::blocks(2, 4).then(Err(CaptureError::Unknown("mic unplugged".into())));
        let capture = StreamingCapture::start(source, Arc::clone(&sink), options(4), Arc::new(RecordingFlag::new())).unwrap();

        let outcome = capture.join().unwrap();
        assert!(matches!(outcome.end, CaptureEnd::Failed(CaptureError::AudioSourceError(_))));
        assert_eq!(outcome.bytes_written, 8);
        assert_eq!(sink.lock().len(), 8);
    }

    #[test]
    fn sink_error_is_reported() {
        let capture = StreamingCapture::start(
            ScriptedSource::blocks(10, 4),
            FailingSink { accepted: 2 },
            options(4),
            Arc::new(RecordingFlag::new()),
        )
        .unwrap();

        let outcome = capture.join().unwrap();
        assert!(matches!(outcome.end, CaptureEnd::Failed(CaptureError::StorageWriteError(_))));
        assert_eq!(outcome.bytes_written, 8);
    }

    #[test]
    fn size_limit_truncates_final_block() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let capture = StreamingCapture::start(
            ScriptedSource::blocks(10, 4),
            Arc::clone(&sink),
            CaptureOptions {
                block_size: 4,
                pipeline_depth: 1,
                max_bytes: 10,
            },
            Arc::new(RecordingFlag::new()),
        )
        .unwrap();

        let outcome = capture.join().unwrap();
        assert_eq!(outcome.end, CaptureEnd::SizeLimit);
        assert_eq!(outcome.bytes_written, 10);
        assert_eq!(*sink.lock(), vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3]);
    }
}
