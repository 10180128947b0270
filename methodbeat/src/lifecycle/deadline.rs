//! One-shot cancellable timer.
//!
//! A dedicated thread sleeps on a condvar until the delay elapses or the
//! deadline is cancelled, then runs its task at most once.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use log::debug;

use crate::domain::TracerError;

#[derive(Default)]
struct Signal {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

pub struct Deadline {
    name: &'static str,
    signal: Arc<Signal>,
}

impl Deadline {
    /// Run `task` on a new thread after `delay` unless cancelled first.
    ///
    /// # Errors
    /// Returns [`TracerError::ThreadSpawn`] if the timer thread cannot start.
    pub fn schedule(
        name: &'static str,
        delay: Duration,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<Self, TracerError> {
        let signal = Arc::new(Signal::default());
        let waiter = Arc::clone(&signal);

        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let cancelled = waiter.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
                let (cancelled, _) = waiter
                    .wake
                    .wait_timeout_while(cancelled, delay, |cancelled| !*cancelled)
                    .unwrap_or_else(PoisonError::into_inner);
                if *cancelled {
                    debug!("[{name}] cancelled");
                    return;
                }
                drop(cancelled);
                task();
            })
            .map_err(|source| TracerError::ThreadSpawn { name, source })?;

        Ok(Self { name, signal })
    }

    /// Prevent the task from running if it has not started yet.
    pub fn cancel(&self) {
        let mut cancelled = self.signal.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.signal.wake.notify_all();
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Deadline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deadline").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_task_runs_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let _deadline =
            Deadline::schedule("test-deadline", Duration::from_millis(10), move || {
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(200));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_prevents_task() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let deadline =
            Deadline::schedule("test-deadline", Duration::from_millis(50), move || {
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();

        deadline.cancel();
        std::thread::sleep(Duration::from_millis(150));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
