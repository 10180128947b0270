//! # Lifecycle Controller
//!
//! [`MethodBeat`] owns every recording component and is the only place where
//! their lifetimes are decided.
//!
//! ## State Machine
//!
//! ```text
//!                first record / start()             start()
//!   DEFAULT ─────────────────────────────► READY ───────────► STARTED
//!      │                                     │                 │   ▲
//!      │ idle-release delay                  │ expiry delay    │   │ start()
//!      ▼                                     ▼                 ▼   │
//!   OUT_OF_RELEASE                     EXPIRED_START        STOPPED
//!                                            │   start()       ▲
//!                                            └──────► STARTED  │ stop() / force_stop()
//! ```
//!
//! Every transition happens under one status lock. Hot paths
//! (`record_enter`, `record_exit`, `is_alive`) read the status without it and
//! tolerate seeing a transition late.
//!
//! ## Buffer lifetime
//!
//! The buffer sits behind an `ArcSwapOption`. Releasing swaps in `None`;
//! writers that loaded the old `Arc` just before finish their store into an
//! allocation nobody reads anymore.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use arc_swap::ArcSwapOption;
use log::{debug, error, info, warn};
use methodbeat_common::{EventKind, EventRecord};

use super::{Deadline, Status, StatusCell};
use crate::config::TracerConfig;
use crate::domain::{MethodId, Position, ThreadId, TimeOffset, TracerError};
use crate::looper::{DispatchListener, LoopObserver};
use crate::recording::{Bookmark, DispatchGate, EventBuffer, IndexRegistry, TimeKeeper};

/// Callback fired for every recorded method entry.
pub trait MethodEnterListener: Send + Sync {
    fn enter(&self, method: MethodId, thread: ThreadId);
}

/// Pending timers, guarded together with the status.
#[derive(Default)]
struct Timers {
    release: Option<Deadline>,
    expire: Option<Deadline>,
}

struct Shared {
    config: TracerConfig,
    status: Arc<StatusCell>,
    status_lock: Mutex<Timers>,
    keeper: Arc<TimeKeeper>,
    gate: DispatchGate,
    buffer: ArcSwapOption<EventBuffer>,
    registry: IndexRegistry,
    observer: Arc<dyn LoopObserver>,
    loop_listener: Arc<dyn DispatchListener>,
    enter_listener: ArcSwapOption<Box<dyn MethodEnterListener>>,
}

/// Adapter registered with the host loop observer on bring-up.
struct LoopListener {
    shared: Weak<Shared>,
}

impl DispatchListener for LoopListener {
    fn is_valid(&self) -> bool {
        self.shared.upgrade().is_some_and(|shared| shared.status.is_actively_tracing())
    }

    fn on_dispatch_begin(&self) {
        if let Some(shared) = self.shared.upgrade() {
            if shared.gate.begin() && shared.status.is_actively_tracing() {
                shared.write(EventKind::Enter, MethodId::DISPATCH);
            }
        }
    }

    fn on_dispatch_end(&self) {
        if let Some(shared) = self.shared.upgrade() {
            if shared.gate.is_dispatching() && shared.status.is_actively_tracing() {
                shared.write(EventKind::Exit, MethodId::DISPATCH);
            }
            shared.gate.end();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Timers> {
        self.status_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, kind: EventKind, method: MethodId) -> Option<Position> {
        let guard = self.buffer.load();
        let buffer = (*guard).as_deref()?;
        Some(buffer.write(kind, method, self.keeper.current_offset()))
    }

    fn record(self: &Arc<Self>, kind: EventKind, method: MethodId, thread: ThreadId) {
        let rank = self.status.rank();
        if rank <= Status::Stopped.rank() {
            return;
        }
        if rank == Status::Default.rank() {
            self.bring_up_from_record();
            if !self.status.accepts_records() {
                return;
            }
        }
        if let Some(loop_thread) = self.config.loop_thread {
            if thread != loop_thread {
                return;
            }
        }

        if self.write(kind, method.recordable()).is_none() {
            return;
        }
        if kind == EventKind::Enter {
            if let Some(listener) = &*self.enter_listener.load() {
                listener.enter(method, thread);
            }
        }
    }

    /// Lazy bring-up triggered by an instrumented call. Failures cannot reach
    /// the call site, so they park the tracer in STOPPED instead.
    fn bring_up_from_record(self: &Arc<Self>) {
        let mut timers = self.lock();
        if self.status.get() != Status::Default {
            return;
        }
        if let Err(e) = self.bring_up(&mut timers, true) {
            error!("[bring_up] {e}, tracing disabled");
            self.status.set(Status::Stopped);
        }
    }

    /// DEFAULT → READY. Caller holds the status lock and has checked the status.
    ///
    /// `start()` moves on to STARTED right away and passes `schedule_expiry:
    /// false`, since it would only cancel the timer again.
    fn bring_up(
        self: &Arc<Self>,
        timers: &mut Timers,
        schedule_expiry: bool,
    ) -> Result<(), TracerError> {
        info!("[bring_up] epoch+{:?}", self.keeper.elapsed());

        if schedule_expiry {
            let weak = Arc::downgrade(self);
            let expire = Deadline::schedule(
                "methodbeat-start-expire",
                self.config.start_expire_delay(),
                move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.expire_start();
                    }
                },
            )?;
            timers.expire = Some(expire);
        }

        if let Some(release) = timers.release.take() {
            release.cancel();
        }

        self.keeper.resume();
        self.observer.register(Arc::clone(&self.loop_listener));
        self.status.set(Status::Ready);
        Ok(())
    }

    fn expire_start(&self) {
        let mut timers = self.lock();
        let status = self.status.get();
        info!("[start_expired] status:{status}");
        if matches!(status, Status::Default | Status::Ready) {
            self.status.set(Status::ExpiredStart);
        }
        timers.expire = None;
    }

    fn release_if_unused(&self) {
        let mut timers = self.lock();
        if self.status.get() != Status::Default {
            debug!("[release] skipped, status:{}", self.status.get());
            return;
        }
        info!("[release] never used, freeing buffer");

        if let Some(expire) = timers.expire.take() {
            expire.cancel();
        }
        timers.release = None;
        self.observer.unregister(&self.loop_listener);
        self.keeper.shutdown();
        self.buffer.store(None);
        self.registry.clear();
        self.status.set(Status::Released);
    }
}

/// Method tracer: lifecycle controller plus the recording components it
/// gates.
///
/// Construct one per monitored loop and share it behind an `Arc`.
/// Dropping it stops the background threads.
pub struct MethodBeat {
    shared: Arc<Shared>,
}

impl MethodBeat {
    /// Allocate the buffer, spawn the (parked) time keeper and schedule the
    /// idle release.
    ///
    /// # Errors
    /// Invalid configuration or a failure to spawn a background thread.
    pub fn new(config: TracerConfig, observer: Arc<dyn LoopObserver>) -> Result<Self, TracerError> {
        config.validate()?;

        let status = Arc::new(StatusCell::new(Status::Default));
        let running = Arc::clone(&status);
        let keeper =
            TimeKeeper::spawn(config.time_update_cycle(), Box::new(move || running.accepts_records()))?;

        let buffer = Arc::new(EventBuffer::new(config.buffer_capacity));
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| Shared {
            status,
            status_lock: Mutex::new(Timers::default()),
            gate: DispatchGate::new(Arc::clone(&keeper)),
            keeper,
            buffer: ArcSwapOption::new(Some(buffer)),
            registry: IndexRegistry::new(),
            observer,
            loop_listener: Arc::new(LoopListener { shared: weak.clone() }),
            enter_listener: ArcSwapOption::empty(),
            config,
        });

        let weak = Arc::downgrade(&shared);
        let release = Deadline::schedule(
            "methodbeat-release",
            shared.config.release_buffer_delay(),
            move || {
                if let Some(shared) = weak.upgrade() {
                    shared.release_if_unused();
                }
            },
        );
        match release {
            Ok(release) => shared.lock().release = Some(release),
            Err(e) => {
                shared.keeper.shutdown();
                return Err(e);
            }
        }

        debug!("[new] capacity={} cycle={:?}", shared.config.buffer_capacity, shared.keeper.cycle());
        Ok(Self { shared })
    }

    // ------------------------------------------------------------------
    // Monitoring clients
    // ------------------------------------------------------------------

    /// Move to STARTED.
    ///
    /// Legal from DEFAULT (bringing the tracer up first), READY, STOPPED and
    /// EXPIRED_START. Returns `Ok(false)` with a logged warning when called
    /// from any other status.
    ///
    /// # Errors
    /// [`TracerError::BufferReleased`] once the buffer has been freed, and
    /// [`TracerError::ThreadSpawn`] if bring-up cannot start its timer.
    pub fn start(&self) -> Result<bool, TracerError> {
        let shared = &self.shared;
        let mut timers = shared.lock();

        if shared.buffer.load().is_none() {
            error!("[start] buffer released, status:{}", shared.status.get());
            return Err(TracerError::BufferReleased);
        }
        if shared.status.get() == Status::Default {
            shared.bring_up(&mut timers, false)?;
        }

        let status = shared.status.get();
        if !status.can_start() {
            warn!("[start] current status:{status}");
            return Ok(false);
        }

        if let Some(expire) = timers.expire.take() {
            expire.cancel();
        }
        info!("[start] pre status:{status}");
        shared.status.set(Status::Started);
        shared.keeper.signal();
        Ok(true)
    }

    /// STARTED → STOPPED. Returns `false` with a logged warning otherwise.
    pub fn stop(&self) -> bool {
        let _timers = self.shared.lock();
        let status = self.shared.status.get();
        if status != Status::Started {
            warn!("[stop] current status:{status}");
            return false;
        }
        info!("[stop]");
        self.shared.status.set(Status::Stopped);
        true
    }

    /// Unconditionally STOPPED.
    pub fn force_stop(&self) {
        let _timers = self.shared.lock();
        info!("[force_stop] pre status:{}", self.shared.status.get());
        self.shared.status.set(Status::Stopped);
    }

    /// Rank ≥ STARTED. Lock-free, may lag a concurrent transition.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.shared.status.is_alive()
    }

    /// Rank ≥ READY. Lock-free, may lag a concurrent transition.
    #[inline]
    #[must_use]
    pub fn is_actively_tracing(&self) -> bool {
        self.shared.status.is_actively_tracing()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.shared.status.get()
    }

    /// Bookmark the most recently written slot.
    ///
    /// `None` once the buffer has been released.
    pub fn mark(&self, source: impl Into<String>) -> Option<Bookmark> {
        let guard = self.shared.buffer.load();
        let (position, sequence) = (*guard).as_deref()?.head();
        Some(self.shared.registry.mark(source, position, sequence))
    }

    /// Records from `start` through `end`, or through the newest record when
    /// `end` is `None`.
    ///
    /// Empty if either bookmark was released, `end` predates `start`, the
    /// write `start` points at has been overwritten, or the buffer is gone.
    #[must_use]
    pub fn copy_between(&self, start: &Bookmark, end: Option<&Bookmark>) -> Vec<EventRecord> {
        let guard = self.shared.buffer.load();
        let Some(buffer) = (*guard).as_deref() else {
            return Vec::new();
        };
        if !start.is_valid() || end.is_some_and(|end| !end.is_valid()) {
            return Vec::new();
        }
        let last = end.map_or_else(|| buffer.total_written(), Bookmark::sequence);
        buffer.copy_sequences(start.sequence(), last).unwrap_or_else(|| {
            debug!("[copy_between] {} no longer covers seq:{last}", start.record());
            Vec::new()
        })
    }

    /// Whether `bookmark` is still registered and its write still in the
    /// buffer.
    #[must_use]
    pub fn is_retained(&self, bookmark: &Bookmark) -> bool {
        let guard = self.shared.buffer.load();
        let Some(buffer) = (*guard).as_deref() else {
            return false;
        };
        let first = bookmark.sequence().max(1);
        bookmark.is_valid() && buffer.total_written() - (first - 1) <= buffer.capacity()
    }

    /// Every retained record, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.shared.buffer.load_full().map(|b| b.records_oldest_first()).unwrap_or_default()
    }

    #[must_use]
    pub fn registry(&self) -> &IndexRegistry {
        &self.shared.registry
    }

    pub fn set_method_enter_listener(&self, listener: Option<Box<dyn MethodEnterListener>>) {
        self.shared.enter_listener.store(listener.map(Arc::new));
    }

    // ------------------------------------------------------------------
    // Instrumented call sites
    // ------------------------------------------------------------------

    /// Record a method entry. Never fails; dropped when not recording.
    #[inline]
    pub fn record_enter(&self, method: MethodId, thread: ThreadId) {
        self.shared.record(EventKind::Enter, method, thread);
    }

    /// Record a method exit. Never fails; dropped when not recording.
    #[inline]
    pub fn record_exit(&self, method: MethodId, thread: ThreadId) {
        self.shared.record(EventKind::Exit, method, thread);
    }

    /// Write one record regardless of status, stamped with the cached offset.
    ///
    /// `None` once the buffer has been released.
    pub fn write(&self, kind: EventKind, method: MethodId) -> Option<Position> {
        self.shared.write(kind, method)
    }

    // ------------------------------------------------------------------
    // Host loop and introspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn dispatch_gate(&self) -> &DispatchGate {
        &self.shared.gate
    }

    #[must_use]
    pub fn current_offset(&self) -> TimeOffset {
        self.shared.keeper.current_offset()
    }

    #[must_use]
    pub fn time_keeper(&self) -> &Arc<TimeKeeper> {
        &self.shared.keeper
    }

    #[must_use]
    pub fn config(&self) -> &TracerConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn buffer_capacity(&self) -> Option<usize> {
        self.shared.buffer.load_full().map(|b| b.capacity())
    }

    /// Run the idle-release check now instead of waiting for its timer.
    pub fn release_if_unused(&self) {
        self.shared.release_if_unused();
    }

    /// Run the start-expiry check now instead of waiting for its timer.
    pub fn expire_start(&self) {
        self.shared.expire_start();
    }
}

impl Drop for MethodBeat {
    fn drop(&mut self) {
        let mut timers = self.shared.lock();
        if let Some(release) = timers.release.take() {
            release.cancel();
        }
        if let Some(expire) = timers.expire.take() {
            expire.cancel();
        }
        drop(timers);
        self.shared.observer.unregister(&self.shared.loop_listener);
        self.shared.keeper.shutdown();
    }
}

impl std::fmt::Debug for MethodBeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodBeat")
            .field("status", &self.status())
            .field("buffer_capacity", &self.buffer_capacity())
            .field("current_offset", &self.current_offset())
            .finish()
    }
}
