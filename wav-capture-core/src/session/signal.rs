use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Shared "is recording" flag observed by the capture and monitor workers.
///
/// Clearing the flag wakes any worker parked in `wait_while_recording`, so a
/// monitor sleeping between polls notices the stop without waiting out its
/// interval.
#[derive(Debug)]
pub struct RecordingFlag {
    recording: AtomicBool,
    lock: Mutex<()>,
    changed: Condvar,
}

impl RecordingFlag {
    pub fn new() -> Self {
        Self {
            recording: AtomicBool::new(true),
            lock: Mutex::new(()),
            changed: Condvar::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Clear the flag. Returns `true` if this call performed the transition.
    pub fn request_stop(&self) -> bool {
        let _guard = self.lock.lock();
        let was_recording = self.recording.swap(false, Ordering::SeqCst);
        self.changed.notify_all();
        was_recording
    }

    /// Park for up to `timeout` while the flag stays set.
    ///
    /// Returns whether recording is still active afterwards.
    pub fn wait_while_recording(&self, timeout: Duration) -> bool {
        let mut guard = self.lock.lock();
        if self.is_recording() {
            self.changed
                .wait_while_for(&mut guard, |_| self.recording.load(Ordering::SeqCst), timeout);
        }
        self.is_recording()
    }
}

impl Default for RecordingFlag {
    fn default() -> Self {
        Self::new()
    }
}
