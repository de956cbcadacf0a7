use std::path::Path;

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;

/// Event delegate for capture session notifications.
///
/// Methods are called from the session's worker threads, never from the
/// thread that called `begin_session`/`end_session`. Implementations should
/// marshal to their UI thread if needed and must not block.
///
/// Never call `begin_session`, `end_session` or `wait_for_completion` from
/// inside a callback: each of them waits for the thread that is running the
/// callback, and the session deadlocks. Hand the call off to another thread.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &SessionState);

    /// Called once when free space drops below the threshold, on the
    /// space-monitor thread. Recording has already been asked to stop and is
    /// finalized without further action; everything captured so far is kept.
    /// The supervisor joins the monitor before finalizing, so calling
    /// `end_session` here deadlocks. Use `on_session_completed` to learn
    /// when the file is ready.
    fn on_low_space(&self, free_bytes: u64);

    /// Called once when a session ends in `Failed`.
    fn on_session_failed(&self, error: &CaptureError);

    /// Called once when the file has been finalized.
    fn on_session_completed(&self, result: &RecordingResult);

    /// Called when the audio source cannot be opened.
    fn on_capture_hardware_unavailable(&self);

    /// A new media file is ready for indexing.
    fn on_media_file_available(&self, _path: &Path) {}
}
