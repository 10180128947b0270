//! Single-threaded work loop
//!
//! A minimal host loop: one dedicated thread pulls jobs from a channel and
//! runs them one at a time, telling a [`LoopMonitor`] when each job starts
//! and finishes. Used by the CLI and by tests as a stand-in for a real UI or
//! main thread loop.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};

use super::LoopMonitor;
use crate::domain::ThreadId;

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Stable small id for the calling thread, assigned on first use.
#[must_use]
pub fn current_thread_id() -> ThreadId {
    THREAD_ID.with(|cell| {
        let mut id = cell.get();
        if id == 0 {
            id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
            cell.set(id);
        }
        ThreadId(id)
    })
}

pub struct WorkLoop {
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl WorkLoop {
    /// Spawn the loop thread.
    ///
    /// # Errors
    /// Returns an error if the OS refuses a new thread.
    pub fn spawn(name: &str, monitor: Arc<LoopMonitor>) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let (id_tx, id_rx) = crossbeam_channel::bounded(1);

        let handle = std::thread::Builder::new().name(name.to_string()).spawn(move || {
            let _ = id_tx.send(current_thread_id());
            run(&rx, &monitor);
        })?;

        let thread_id = id_rx
            .recv()
            .map_err(|_| std::io::Error::other("work loop thread exited before starting"))?;

        Ok(Self { tx: Some(tx), handle: Some(handle), thread_id })
    }

    /// Id the loop thread reports through [`current_thread_id`].
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Queue a job. Returns `false` once the loop has been shut down.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match self.tx {
            Some(ref tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Run the jobs already queued, then stop the loop thread.
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("[work_loop] loop thread panicked");
            }
        }
    }
}

impl Drop for WorkLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(rx: &Receiver<Job>, monitor: &LoopMonitor) {
    debug!("[work_loop] started on {}", current_thread_id());
    for job in rx {
        monitor.dispatch_begin();
        job();
        monitor.dispatch_end();
    }
    debug!("[work_loop] queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::looper::{DispatchListener, LoopObserver};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal(Mutex<Vec<&'static str>>);

    impl DispatchListener for Journal {
        fn on_dispatch_begin(&self) {
            self.0.lock().unwrap().push("begin");
        }
        fn on_dispatch_end(&self) {
            self.0.lock().unwrap().push("end");
        }
    }

    #[test]
    fn test_jobs_are_bracketed_by_dispatch() {
        let monitor = Arc::new(LoopMonitor::new());
        let journal = Arc::new(Journal::default());
        monitor.register(journal.clone());

        let mut work_loop = WorkLoop::spawn("test-loop", Arc::clone(&monitor)).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..2 {
            let tx = tx.clone();
            assert!(work_loop.post(move || tx.send(i).unwrap()));
        }
        work_loop.shutdown();

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(*journal.0.lock().unwrap(), vec!["begin", "end", "begin", "end"]);
        assert!(!work_loop.post(|| {}));
    }

    #[test]
    fn test_loop_thread_id_differs_from_caller() {
        let monitor = Arc::new(LoopMonitor::new());
        let work_loop = WorkLoop::spawn("test-loop-id", monitor).unwrap();
        assert_ne!(work_loop.thread_id(), current_thread_id());
        assert_eq!(current_thread_id(), current_thread_id());
    }
}
