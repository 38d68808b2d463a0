//! Stop signal shared between the capture loop, the negotiator and every
//! MJPEG stream.
//!
//! Sleeps go through [`StopSignal::sleep`], which wakes as soon as the signal
//! is raised, so shutdown latency is bounded by one blocking transport read
//! rather than by the longest configured interval.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.lock() = true;
        self.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.lock()
    }

    /// Re-arm after a completed stop so the subsystem can be started again.
    pub(crate) fn reset(&self) {
        *self.lock() = false;
    }

    /// Sleep for `duration` or until stopped. Returns `true` if stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut stopped = self.lock();
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = match self.wake.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn sleep_runs_to_deadline_when_not_stopped() {
        let signal = StopSignal::new();
        let started = Instant::now();
        assert!(!signal.sleep(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn stop_wakes_a_long_sleep() {
        let signal = Arc::new(StopSignal::new());
        let sleeper = signal.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        signal.stop();

        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn reset_rearms_the_signal() {
        let signal = StopSignal::new();
        signal.stop();
        assert!(signal.sleep(Duration::from_secs(1)));
        signal.reset();
        assert!(!signal.is_stopped());
    }
}
