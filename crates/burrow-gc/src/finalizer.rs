//! The finalizer thread.
//!
//! Finalizers (object finalizers and arena drop finalizers) are queued by
//! the collector thread at the end of a cycle and run here, one at a time,
//! in queue order. A panicking finalizer is logged and skipped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{error, trace};

/// A queued finalizer.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

enum Msg {
    Run(Job),
    Stop,
}

/// Sending half of the queue plus the pending-job count.
pub(crate) struct FinalizerQueue {
    tx: Sender<Msg>,
    pending: Mutex<usize>,
    idle: Condvar,
}

impl FinalizerQueue {
    /// Create the queue and the receiving half for the thread.
    pub(crate) fn new() -> (Self, FinalizerWorker) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Self {
                tx,
                pending: Mutex::new(0),
                idle: Condvar::new(),
            },
            FinalizerWorker { rx },
        )
    }

    pub(crate) fn push(&self, job: Job) {
        *self.pending.lock() += 1;
        if self.tx.send(Msg::Run(job)).is_err() {
            self.finish_one();
        }
    }

    /// Ask the thread to exit after the jobs already queued.
    pub(crate) fn stop(&self) {
        let _ = self.tx.send(Msg::Stop);
    }

    /// Jobs queued or running.
    pub(crate) fn pending(&self) -> usize {
        *self.pending.lock()
    }

    /// Wait until no job is queued or running. Returns `false` on timeout.
    pub(crate) fn block_until_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        while *pending > 0 {
            if self.idle.wait_until(&mut pending, deadline).timed_out() {
                return *pending == 0;
            }
        }
        true
    }

    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Receiving half, moved onto the finalizer thread.
pub(crate) struct FinalizerWorker {
    rx: Receiver<Msg>,
}

impl FinalizerWorker {
    pub(crate) fn spawn(self, queue: Arc<FinalizerQueue>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("burrow-finalizer".into())
            .spawn(move || self.run(&queue))
    }

    fn run(self, queue: &FinalizerQueue) {
        while let Ok(msg) = self.rx.recv() {
            match msg {
                Msg::Run(job) => {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                        let what = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "non-string panic".into());
                        error!(panic = %what, "finalizer panicked");
                    }
                    queue.finish_one();
                }
                Msg::Stop => break,
            }
        }
        trace!("finalizer thread exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> (Arc<FinalizerQueue>, JoinHandle<()>) {
        let (queue, worker) = FinalizerQueue::new();
        let queue = Arc::new(queue);
        let handle = worker.spawn(Arc::clone(&queue)).unwrap();
        (queue, handle)
    }

    #[test]
    fn jobs_run_and_queue_empties() {
        let (queue, handle) = start();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            queue.push(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(queue.block_until_empty(Duration::from_secs(2)));
        assert_eq!(ran.load(Ordering::SeqCst), 10);
        queue.stop();
        handle.join().unwrap();
    }

    #[test]
    fn panicking_job_does_not_stall_the_queue() {
        let (queue, handle) = start();
        let ran = Arc::new(AtomicUsize::new(0));
        queue.push(Box::new(|| panic!("boom")));
        let after = Arc::clone(&ran);
        queue.push(Box::new(move || {
            after.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(queue.block_until_empty(Duration::from_secs(2)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending(), 0);
        queue.stop();
        handle.join().unwrap();
    }

    #[test]
    fn timeout_reports_false() {
        let (queue, handle) = start();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        queue.push(Box::new(move || {
            let _ = release_rx.recv();
        }));
        assert!(!queue.block_until_empty(Duration::from_millis(20)));
        release_tx.send(()).unwrap();
        assert!(queue.block_until_empty(Duration::from_secs(2)));
        queue.stop();
        handle.join().unwrap();
    }
}
