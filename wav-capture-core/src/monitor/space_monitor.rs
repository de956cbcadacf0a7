use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::error::CaptureError;
use crate::session::signal::RecordingFlag;
use crate::traits::capacity_oracle::CapacityOracle;

/// Watches free storage while a recording is active.
///
/// Polls immediately, then once per `interval`. The first reading below
/// `threshold` clears the recording flag, is passed to `on_low_space`, and
/// the monitor exits. If the flag was already cleared by someone else the
/// callback does not run. The sleep between polls ends as soon as the
/// recording flag is cleared.
pub struct SpaceMonitor {
    handle: thread::JoinHandle<Option<u64>>,
}

impl SpaceMonitor {
    pub fn spawn<F>(
        oracle: Arc<dyn CapacityOracle>,
        flag: Arc<RecordingFlag>,
        interval: Duration,
        threshold: u64,
        on_low_space: F,
    ) -> Result<Self, CaptureError>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("space-monitor".into())
            .spawn(move || poll_loop(oracle.as_ref(), &flag, interval, threshold, on_low_space))
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn space monitor: {}", e)))?;
        Ok(Self { handle })
    }

    /// Wait for the monitor to exit. Returns the free-byte reading that
    /// triggered the low-space callback, if it fired.
    pub fn join(self) -> Option<u64> {
        match self.handle.join() {
            Ok(triggered) => triggered,
            Err(_) => {
                log::error!("Space monitor thread panicked");
                None
            }
        }
    }
}

fn poll_loop<F: FnOnce(u64)>(
    oracle: &dyn CapacityOracle,
    flag: &RecordingFlag,
    interval: Duration,
    threshold: u64,
    on_low_space: F,
) -> Option<u64> {
    while flag.is_recording() {
        match oracle.free_bytes() {
            Ok(free) if free < threshold => {
                // A stop that landed first belongs to whoever requested it.
                if !flag.request_stop() {
                    break;
                }
                log::warn!("Only {} bytes free (threshold {}), stopping recording", free, threshold);
                on_low_space(free);
                return Some(free);
            }
            Ok(free) => log::trace!("{} bytes free", free),
            Err(e) => log::warn!("Free space check failed: {}", e),
        }

        if !flag.wait_while_recording(interval) {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use parking_lot::Mutex;

    #[test]
    fn fires_on_first_poll_and_stops_recording() {
        let flag = Arc::new(RecordingFlag::new());
        let fired = Arc::new(Mutex::new(Vec::new()));

        let monitor = {
            let fired = Arc::clone(&fired);
            SpaceMonitor::spawn(
                Arc::new(|| 1024u64),
                Arc::clone(&flag),
                Duration::from_secs(3),
                5_242_880,
                move |free| fired.lock().push(free),
            )
            .unwrap()
        };

        assert_eq!(monitor.join(), Some(1024));
        assert_eq!(*fired.lock(), vec![1024]);
        assert!(!flag.is_recording());
    }

    #[test]
    fn fires_exactly_once_when_space_drops_later() {
        let polls = Arc::new(AtomicUsize::new(0));
        let oracle = {
            let polls = Arc::clone(&polls);
            move || {
                let n = polls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    100_000_000u64
                } else {
                    10
                }
            }
        };
        let count = Arc::new(AtomicUsize::new(0));

        let monitor = {
            let count = Arc::clone(&count);
            SpaceMonitor::spawn(
                Arc::new(oracle),
                Arc::new(RecordingFlag::new()),
                Duration::from_millis(5),
                5_242_880,
                move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap()
        };

        assert_eq!(monitor.join(), Some(10));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exits_promptly_when_recording_stops() {
        let flag = Arc::new(RecordingFlag::new());
        let monitor = SpaceMonitor::spawn(
            Arc::new(|| u64::MAX),
            Arc::clone(&flag),
            Duration::from_secs(60),
            5_242_880,
            |_| panic!("must not fire"),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        flag.request_stop();

        assert_eq!(monitor.join(), None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn stop_during_poll_is_not_reported_as_low_space() {
        let flag = Arc::new(RecordingFlag::new());
        let oracle = {
            let flag = Arc::clone(&flag);
            move || {
                flag.request_stop();
                0u64
            }
        };

        let monitor = SpaceMonitor::spawn(
            Arc::new(oracle),
            Arc::clone(&flag),
            Duration::from_secs(60),
            5_242_880,
            |_| panic!("must not fire"),
        )
        .unwrap();
        assert_eq!(monitor.join(), None);
    }

    #[test]
    fn oracle_errors_do_not_stop_polling() {
        struct Flaky(AtomicUsize);
        impl CapacityOracle for Flaky {
            fn free_bytes(&self) -> Result<u64, CaptureError> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CaptureError::StorageUnavailable("busy".into()))
                } else {
                    Ok(0)
                }
            }
        }

        let monitor = SpaceMonitor::spawn(
            Arc::new(Flaky(AtomicUsize::new(0))),
            Arc::new(RecordingFlag::new()),
            Duration::from_millis(1),
            5_242_880,
            |_| {},
        )
        .unwrap();
        assert_eq!(monitor.join(), Some(0));
    }
}
