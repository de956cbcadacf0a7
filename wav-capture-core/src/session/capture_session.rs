use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::capture::streaming::{CaptureEnd, CaptureOptions, CaptureOutcome, StreamingCapture};
use crate::models::config::CaptureConfig;
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult, StopReason};
use crate::models::state::SessionState;
use crate::monitor::space_monitor::SpaceMonitor;
use crate::session::signal::RecordingFlag;
use crate::storage::header_finalizer::{FinalizeReport, HeaderFinalizer};
use crate::storage::metadata;
use crate::storage::recording_file::{self, RecordingFile};
use crate::traits::audio_source::AudioSource;
use crate::traits::capacity_oracle::CapacityOracle;
use crate::traits::capture_delegate::CaptureDelegate;

/// How often waiters re-check that the supervisor thread is still alive.
const SUPERVISOR_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Authoritative session state, protected by `parking_lot::Mutex`.
struct SessionInner {
    state: SessionState,
    /// A `begin_session` call owns the session but has not reached `Recording`.
    starting: bool,
    output_path: Option<PathBuf>,
    header_written: bool,
    bytes_written: Option<Arc<AtomicU64>>,
    outcome: Option<Result<RecordingResult, CaptureError>>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            starting: false,
            output_path: None,
            header_written: false,
            bytes_written: None,
            outcome: None,
        }
    }
}

/// State shared between the session handle and its supervisor thread.
struct Shared<S> {
    inner: Mutex<SessionInner>,
    settled: Condvar,
    source: Mutex<Option<S>>,
    oracle: Arc<dyn CapacityOracle>,
}

impl<S> Shared<S> {
    fn set_state(&self, delegate: &Option<Arc<dyn CaptureDelegate>>, new_state: SessionState) {
        self.inner.lock().state = new_state.clone();
        if let Some(d) = delegate {
            d.on_state_changed(&new_state);
        }
    }

    /// Record the terminal outcome and wake every waiter. Runs once per file.
    fn settle(&self, delegate: &Option<Arc<dyn CaptureDelegate>>, outcome: Result<RecordingResult, CaptureError>) {
        let state = match &outcome {
            Ok(result) => SessionState::Completed(Box::new(result.clone())),
            Err(e) => SessionState::Failed(e.clone()),
        };
        {
            let mut inner = self.inner.lock();
            inner.state = state.clone();
            inner.outcome = Some(outcome.clone());
            self.settled.notify_all();
        }

        if let Some(d) = delegate {
            d.on_state_changed(&state);
            match &outcome {
                Ok(result) => {
                    d.on_session_completed(result);
                    d.on_media_file_available(&result.file_path);
                }
                Err(e) => d.on_session_failed(e),
            }
        }
    }
}

/// Capture session orchestrator.
///
/// Owns the session state and the output path; the workers only see the
/// shared `RecordingFlag`. Each recording runs on four threads:
/// ```text
/// audio-capture → audio-writer → [RecordingFile]      (StreamingCapture)
/// space-monitor ── low space ──→ RecordingFlag        (SpaceMonitor)
/// capture-session: join capture → stop monitor → HeaderFinalizer
/// ```
/// The supervisor (`capture-session`) is the only place a file is
/// finalized, whether recording stopped because `end_session` was called, the
/// source ran dry, the size limit was hit, or free space ran low.
///
/// Dropping an active session stops it and waits for finalization.
pub struct CaptureSession<S: AudioSource + 'static> {
    shared: Arc<Shared<S>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    flag: Mutex<Option<Arc<RecordingFlag>>>,
    supervisor: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<S: AudioSource + 'static> CaptureSession<S> {
    pub fn new(source: S, oracle: Arc<dyn CapacityOracle>) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(SessionInner::new()),
                settled: Condvar::new(),
                source: Mutex::new(Some(source)),
                oracle,
            }),
            delegate: None,
            flag: Mutex::new(None),
            supervisor: Mutex::new(None),
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state.clone()
    }

    /// Path of the current (or last) recording.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.shared.inner.lock().output_path.clone()
    }

    /// PCM bytes persisted so far for the current (or last) recording.
    pub fn bytes_written(&self) -> u64 {
        self.shared
            .inner
            .lock()
            .bytes_written
            .as_ref()
            .map_or(0, |counter| counter.load(Ordering::SeqCst))
    }

    /// Whether the current file carries its final header.
    pub fn is_header_written(&self) -> bool {
        self.shared.inner.lock().header_written
    }

    /// Start recording to `output_path`. Transitions: idle/completed/failed → recording.
    ///
    /// An existing file at `output_path` is overwritten.
    pub fn begin_session(&self, config: CaptureConfig, output_path: impl Into<PathBuf>) -> Result<(), CaptureError> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state.is_active() || inner.starting {
                return Err(CaptureError::InvalidState("a recording is already in progress".into()));
            }
            inner.starting = true;
        }

        let started = self.start_recording(config, output_path.into());
        self.shared.inner.lock().starting = false;
        started
    }

    /// Runs with the session claimed: no other recording is active or starting.
    fn start_recording(&self, config: CaptureConfig, output_path: PathBuf) -> Result<(), CaptureError> {
        config.validate().map_err(CaptureError::InvalidConfig)?;
        recording_file::validate_output_path(&output_path)?;
        self.reap_supervisor();

        let mut source = self
            .shared
            .source
            .lock()
            .take()
            .ok_or_else(|| CaptureError::InvalidState("audio source is not available".into()))?;

        let min_buffer = match source.open(config.sample_rate) {
            Ok(size) => size,
            Err(e) => {
                log::error!("Unable to open {}: {}", source.description(), e);
                *self.shared.source.lock() = Some(source);
                if let Some(ref d) = self.delegate {
                    d.on_capture_hardware_unavailable();
                }
                return Err(match e {
                    CaptureError::DeviceUnavailable(_) => e,
                    other => CaptureError::DeviceUnavailable(other.to_string()),
                });
            }
        };

        let file = match RecordingFile::create(output_path.clone()) {
            Ok(file) => file,
            Err(e) => {
                if let Err(close_err) = source.close() {
                    log::warn!("Failed to close {}: {}", source.description(), close_err);
                }
                *self.shared.source.lock() = Some(source);
                return Err(e);
            }
        };

        let options = CaptureOptions {
            block_size: config.effective_block_size(min_buffer),
            pipeline_depth: config.pipeline_depth,
            max_bytes: config.max_data_length(),
        };
        let flag = Arc::new(RecordingFlag::new());
        *self.flag.lock() = Some(Arc::clone(&flag));

        {
            let mut inner = self.shared.inner.lock();
            inner.output_path = Some(output_path.clone());
            inner.header_written = false;
            inner.bytes_written = None;
            inner.outcome = None;
        }
        self.shared.set_state(&self.delegate, SessionState::Recording);

        let capture = match StreamingCapture::start(source, file, options, Arc::clone(&flag)) {
            Ok(capture) => capture,
            Err(e) => {
                self.shared.settle(&self.delegate, Err(e.clone()));
                return Err(e);
            }
        };
        self.shared.inner.lock().bytes_written = Some(capture.bytes_counter());

        let monitor = {
            let delegate = self.delegate.clone();
            SpaceMonitor::spawn(
                Arc::clone(&self.shared.oracle),
                Arc::clone(&flag),
                config.poll_interval(),
                config.low_space_threshold,
                move |free_bytes| {
                    if let Some(d) = delegate {
                        d.on_low_space(free_bytes);
                    }
                },
            )
        };
        let monitor = match monitor {
            Ok(monitor) => monitor,
            Err(e) => {
                capture.request_stop();
                if let Ok(outcome) = capture.join() {
                    *self.shared.source.lock() = Some(outcome.source);
                }
                self.shared.settle(&self.delegate, Err(e.clone()));
                return Err(e);
            }
        };

        log::info!(
            "Recording to {} at {} Hz ({} byte blocks)",
            output_path.display(),
            config.sample_rate,
            options.block_size
        );

        let supervision = Supervision {
            shared: Arc::clone(&self.shared),
            delegate: self.delegate.clone(),
            flag: Arc::clone(&flag),
            config,
            path: output_path,
        };
        let handle = thread::Builder::new()
            .name("capture-session".into())
            .spawn(move || supervision.run(capture, monitor));

        match handle {
            Ok(handle) => {
                *self.supervisor.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                // The workers were moved into the failed closure; stopping
                // them leaves the raw file in place.
                flag.request_stop();
                let err = CaptureError::Unknown(format!("failed to spawn session thread: {}", e));
                self.shared.settle(&self.delegate, Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Stop recording, finalize the file and return the result.
    /// Transitions: recording → finalizing → completed/failed.
    ///
    /// Safe to call again, and after the session stopped on its own: the
    /// stored outcome is returned and finalization is never repeated.
    pub fn end_session(&self) -> Result<RecordingResult, CaptureError> {
        {
            let inner = self.shared.inner.lock();
            if let Some(outcome) = &inner.outcome {
                return outcome.clone();
            }
            if !inner.state.is_active() {
                return Err(CaptureError::InvalidState("no recording in progress".into()));
            }
        }

        if let Some(flag) = self.flag.lock().as_ref() {
            if flag.request_stop() {
                log::info!("Stop requested");
            }
        }
        self.wait_for_completion()
    }

    /// Block until the current recording has been finalized, however it stopped.
    pub fn wait_for_completion(&self) -> Result<RecordingResult, CaptureError> {
        let outcome = {
            let mut inner = self.shared.inner.lock();
            loop {
                if let Some(outcome) = &inner.outcome {
                    break outcome.clone();
                }
                if !inner.state.is_active() {
                    return Err(CaptureError::InvalidState("no recording in progress".into()));
                }
                self.shared.settled.wait_for(&mut inner, SUPERVISOR_CHECK_INTERVAL);

                if inner.outcome.is_none() && self.supervisor_exited() {
                    let err = CaptureError::Unknown("session thread exited without a result".into());
                    inner.state = SessionState::Failed(err.clone());
                    inner.outcome = Some(Err(err));
                }
            }
        };
        outcome
    }

    fn supervisor_exited(&self) -> bool {
        self.supervisor
            .lock()
            .as_ref()
            .map_or(false, |handle| handle.is_finished())
    }

    /// Join the previous recording's supervisor. Only called while no
    /// recording is active.
    fn reap_supervisor(&self) {
        if let Some(handle) = self.supervisor.lock().take() {
            if handle.join().is_err() {
                log::error!("Capture session thread panicked");
            }
        }
        *self.flag.lock() = None;
    }
}

impl<S: AudioSource + 'static> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        if let Some(flag) = self.flag.lock().as_ref() {
            flag.request_stop();
        }
        self.reap_supervisor();
    }
}

/// Everything the supervisor thread needs to wind a recording down.
struct Supervision<S> {
    shared: Arc<Shared<S>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    flag: Arc<RecordingFlag>,
    config: CaptureConfig,
    path: PathBuf,
}

impl<S: AudioSource + 'static> Supervision<S> {
    fn run(self, capture: StreamingCapture<S, RecordingFile>, monitor: SpaceMonitor) {
        let outcome = capture.join();
        self.flag.request_stop();
        let low_space = monitor.join();

        let outcome = match outcome {
            Ok(outcome) => self.finish(outcome, low_space),
            Err(e) => Err(e),
        };
        self.shared.settle(&self.delegate, outcome);
    }

    fn finish(
        &self,
        outcome: CaptureOutcome<S, RecordingFile>,
        low_space: Option<u64>,
    ) -> Result<RecordingResult, CaptureError> {
        let CaptureOutcome {
            source,
            mut sink,
            bytes_written,
            end,
        } = outcome;
        *self.shared.source.lock() = Some(source);

        // The file handle is closed before the finalizer opens the path.
        let closed = sink.close();
        drop(sink);

        let stop_reason = match (low_space, &end) {
            (Some(free_bytes), _) => StopReason::LowSpace { free_bytes },
            (None, CaptureEnd::EndOfStream) => StopReason::EndOfStream,
            (None, CaptureEnd::SizeLimit) => StopReason::SizeLimit,
            (None, _) => StopReason::UserRequested,
        };
        let capture_error = match end {
            CaptureEnd::Failed(e) => Some(e),
            _ => closed.err(),
        };
        if let Some(ref e) = capture_error {
            log::error!("Recording failed after {} bytes: {}", bytes_written, e);
        }

        self.shared.set_state(&self.delegate, SessionState::Finalizing);
        let mut finalizer = HeaderFinalizer::new(self.config.sample_rate)
            .with_low_space_threshold(self.config.low_space_threshold)
            .with_shift_block_size(self.config.shift_block_size);
        let report = finalizer.finalize(
            &self.path,
            bytes_written,
            self.shared.oracle.as_ref(),
            self.config.finalize_strategy,
        );

        match (capture_error, report) {
            (None, Ok(report)) => {
                self.shared.inner.lock().header_written = true;
                Ok(self.build_result(&report, stop_reason))
            }
            (Some(e), Ok(report)) => {
                self.shared.inner.lock().header_written = true;
                log::warn!(
                    "Saved the {} bytes recorded before the failure to {}",
                    report.data_length,
                    self.path.display()
                );
                Err(e)
            }
            (Some(e), Err(_)) => Err(e),
            (None, Err(e)) => Err(e),
        }
    }

    fn build_result(&self, report: &FinalizeReport, stop_reason: StopReason) -> RecordingResult {
        let duration_secs = report.data_length as f64 / self.config.bytes_per_second() as f64;
        let checksum = match recording_file::sha256_file(&self.path) {
            Ok(sum) => Some(sum),
            Err(e) => {
                log::warn!("Failed to checksum {}: {}", self.path.display(), e);
                None
            }
        };

        let metadata = RecordingMetadata::new_mono(
            &self.path.to_string_lossy(),
            self.config.sample_rate,
            report.data_length,
            duration_secs,
            report.strategy,
            stop_reason,
            checksum,
        );
        if self.config.write_metadata {
            write_sidecar(&metadata, &self.path);
        }

        RecordingResult {
            file_path: self.path.clone(),
            data_length: report.data_length,
            file_length: report.file_length,
            duration_secs,
            strategy: report.strategy,
            stop_reason,
            metadata,
        }
    }
}

fn write_sidecar(metadata: &RecordingMetadata, path: &Path) {
    match metadata::write_metadata(metadata, path) {
        Ok(sidecar) => log::debug!("Wrote {}", sidecar.display()),
        Err(e) => log::warn!("Recording saved without metadata: {}", e),
    }
}
