//! # Time Keeper
//!
//! Maintains the cached "milliseconds since epoch" value that every event
//! write stamps into its record, so call sites never read the clock.
//!
//! ## Phases
//!
//! ```text
//!            resume()                       pause() / status <= STOPPED
//!   ┌────────┐ ─────────► ┌──────────────┐ ──────────────────────────► ┌────────┐
//!   │ parked │            │ refresh loop │                             │ parked │
//!   └────────┘ ◄───────── └──────────────┘ ◄────────────────────────── └────────┘
//!     condvar wait          store offset, sleep(cycle)       resume()
//! ```
//!
//! While the host loop is idle nothing is instrumented, so the refresh thread
//! parks instead of waking every cycle. `resume()` refreshes the offset on the
//! caller's thread before waking the refresh thread, which keeps the first
//! timestamp after an idle period accurate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::domain::{TimeOffset, TracerError};

const THREAD_NAME: &str = "methodbeat-time-update";

/// Predicate checked before every refresh; the loop parks once it is false.
pub type KeepRunning = Box<dyn Fn() -> bool + Send + 'static>;

pub struct TimeKeeper {
    epoch: Instant,
    cycle: Duration,
    current_offset: AtomicU64,
    paused: AtomicBool,
    shutdown: AtomicBool,
    /// Bumped on every wake-up request so a park never misses a `resume()`.
    wake_generation: Mutex<u64>,
    wake: Condvar,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimeKeeper {
    /// Spawn the refresh thread in the parked state.
    ///
    /// # Errors
    /// Returns [`TracerError::ThreadSpawn`] if the OS refuses a new thread.
    pub fn spawn(cycle: Duration, keep_running: KeepRunning) -> Result<Arc<Self>, TracerError> {
        let keeper = Arc::new(Self {
            epoch: Instant::now(),
            cycle,
            current_offset: AtomicU64::new(0),
            paused: AtomicBool::new(true),
            shutdown: AtomicBool::new(false),
            wake_generation: Mutex::new(0),
            wake: Condvar::new(),
            handle: Mutex::new(None),
        });

        let worker = Arc::clone(&keeper);
        let handle = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || worker.run(&keep_running))
            .map_err(|source| TracerError::ThreadSpawn { name: THREAD_NAME, source })?;
        *keeper.lock_handle() = Some(handle);

        Ok(keeper)
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.wake_generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, keep_running: &KeepRunning) {
        debug!("[time_keeper] thread started, cycle={:?}", self.cycle);
        loop {
            let seen = *self.lock_generation();

            while !self.paused.load(Ordering::Acquire)
                && !self.shutdown.load(Ordering::Acquire)
                && keep_running()
            {
                self.refresh();
                std::thread::sleep(self.cycle);
            }

            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            let generation = self.lock_generation();
            let _parked = self
                .wake
                .wait_while(generation, |current| {
                    *current == seen && !self.shutdown.load(Ordering::Acquire)
                })
                .unwrap_or_else(PoisonError::into_inner);
        }
        debug!("[time_keeper] thread exiting");
    }

    /// Recompute the cached offset from the monotonic clock.
    ///
    /// Never moves the offset backwards, even if a stale refresh from the
    /// background thread lands after a fresher one from `resume()`.
    pub fn refresh(&self) -> TimeOffset {
        let now = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        let previous = self.current_offset.fetch_max(now, Ordering::AcqRel);
        TimeOffset(previous.max(now))
    }

    /// Cached offset, stale by at most one cycle while running.
    #[inline]
    #[must_use]
    pub fn current_offset(&self) -> TimeOffset {
        TimeOffset(self.current_offset.load(Ordering::Relaxed))
    }

    /// True elapsed time since the epoch. Reads the clock; not for hot paths.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    #[must_use]
    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Ask the refresh thread to park after its current cycle.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Refresh the offset now, then wake the refresh thread.
    pub fn resume(&self) {
        self.refresh();
        self.paused.store(false, Ordering::Release);
        self.signal();
    }

    /// Wake the refresh thread without changing the pause flag, so it
    /// re-evaluates its keep-running predicate.
    pub fn signal(&self) {
        let mut generation = self.lock_generation();
        *generation = generation.wrapping_add(1);
        self.wake.notify_all();
    }

    /// Stop the refresh thread and wait for it to exit. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.signal();

        let handle = self.lock_handle().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("[time_keeper] refresh thread panicked");
            }
        }
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TimeKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeKeeper")
            .field("cycle", &self.cycle)
            .field("current_offset", &self.current_offset())
            .field("paused", &self.is_paused())
            .finish()
    }
}
