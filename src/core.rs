//! Operation queue implementation
//!
//! A fixed pool of worker tasks drives the queue: each idle worker selects
//! the highest-priority admissible pending operation, acquires its key lock
//! if it has one, executes it outside the coordination lock, then releases
//! the key and publishes the outcome.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cancel::CancellationSignal;
use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::locks::KeyLockTable;
use crate::outcome::{OperationHandle, Outcome, ResultSlot};
use crate::pending::{PendingOp, PendingSet};

/// Lifetime counters
#[derive(Debug, Default, Clone)]
pub struct QueueStats {
    /// Submissions accepted (including those resolved Cancelled before running)
    pub total_submitted: u64,
    /// Operations whose work future ran to completion
    pub total_completed: u64,
    /// Operations resolved Cancelled without their work ever running
    pub total_cancelled: u64,
    pub peak_pending: usize,
    pub peak_running: usize,
}

/// Point-in-time snapshot of queue occupancy
#[derive(Debug, Clone)]
pub struct QueueState {
    pub running: usize,
    pub pending: usize,
    pub held_keys: usize,
    pub shutdown: bool,
    pub stats: QueueStats,
}

/// State behind the coordination lock. Held only for the brief
/// selection/acquire/release steps, never across an await.
struct Inner {
    pending: PendingSet,
    locks: KeyLockTable,
    running: usize,
    shutdown: bool,
    stats: QueueStats,
}

/// Shared between the queue facade, its workers, and cancellation hooks
struct Shared {
    inner: Mutex<Inner>,
    notify: Notify,
    seq: AtomicU64,
}

/// What an idle worker does next
enum Step {
    /// Execute this operation (key lock already acquired if it has one)
    Run(PendingOp),
    /// Resolve this operation as Cancelled without running it
    Cancel(PendingOp),
    /// Nothing admissible; wait for a wakeup
    Idle,
    /// Shut down
    Exit,
}

/// Asynchronous priority operation queue.
///
/// Submitted work runs under a bounded concurrency budget in priority order
/// (FIFO within a band), with at-most-one-concurrent execution per coalescing
/// key and cooperative cancellation. See [`crate`] docs for the model.
pub struct OperationQueue {
    shared: Arc<Shared>,
    config: QueueConfig,
    workers: Vec<JoinHandle<()>>,
}

impl OperationQueue {
    /// Create a queue and spawn its worker pool.
    ///
    /// Must be called from within a tokio runtime. Fails on invalid
    /// configuration (`max_concurrent == 0`).
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        debug!(?config, "OperationQueue::new: called");
        config.validate()?;

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                pending: PendingSet::new(),
                locks: KeyLockTable::new(),
                running: 0,
                shutdown: false,
                stats: QueueStats::default(),
            }),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
        });

        let workers = (0..config.max_concurrent)
            .map(|worker| {
                let shared = Arc::clone(&shared);
                tokio::spawn(worker_loop(shared, worker))
            })
            .collect();

        Ok(Self {
            shared,
            config,
            workers,
        })
    }

    /// The configured concurrency budget
    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    /// Submit a unit of work.
    ///
    /// `priority` orders admission (higher runs first, FIFO within a band);
    /// operations sharing a `key` never execute concurrently; an optional
    /// `signal` allows cancellation before or during execution. The returned
    /// handle yields exactly one terminal [`Outcome`].
    ///
    /// Rejected synchronously if the queue is shut down. A signal that has
    /// already fired resolves the handle as `Cancelled` without the work ever
    /// being admitted.
    pub fn submit<T, E, F>(
        &self,
        priority: i32,
        key: Option<&str>,
        signal: Option<CancellationSignal>,
        work: F,
    ) -> Result<OperationHandle<T, E>, QueueError>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: Future<Output = Outcome<T, E>> + Send + 'static,
    {
        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);
        debug!(seq, priority, ?key, "OperationQueue::submit: called");

        let (slot, handle) = ResultSlot::channel(seq);

        let run_slot = Arc::clone(&slot);
        let run = Box::pin(async move {
            let outcome = work.await;
            deliver(&run_slot, outcome);
        });
        let abort_slot = Arc::clone(&slot);
        let abort = Box::new(move || deliver(&abort_slot, Outcome::Cancelled));

        {
            let mut inner = self.shared.lock_inner();
            if inner.shutdown {
                debug!(seq, "OperationQueue::submit: rejected, shut down");
                return Err(QueueError::Shutdown);
            }
            inner.stats.total_submitted += 1;

            if signal.as_ref().is_some_and(CancellationSignal::is_cancelled) {
                debug!(seq, "OperationQueue::submit: signal already fired");
                inner.stats.total_cancelled += 1;
                drop(inner);
                deliver(&slot, Outcome::Cancelled);
                return Ok(handle);
            }

            inner.pending.insert(PendingOp {
                seq,
                priority,
                key: key.map(str::to_string),
                signal: signal.clone(),
                run,
                abort,
            });
            inner.stats.peak_pending = inner.stats.peak_pending.max(inner.pending.len());
        }

        // Hook runs synchronously at cancel() time and removes the operation
        // while it is still pending; the dispatcher's pre-run check covers
        // the window between insertion and registration
        if let Some(signal) = &signal {
            let shared = Arc::downgrade(&self.shared);
            signal.on_cancel(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.cancel_pending(seq);
                }
            });
        }

        self.shared.notify.notify_one();
        Ok(handle)
    }

    /// Stop admission and resolve every still-pending operation as
    /// Cancelled. Running work finishes cooperatively; idle workers exit.
    /// Idempotent.
    pub fn shutdown(&self) {
        debug!("OperationQueue::shutdown: called");
        let drained = {
            let mut inner = self.shared.lock_inner();
            if inner.shutdown {
                return;
            }
            inner.shutdown = true;
            let drained = inner.pending.drain();
            inner.stats.total_cancelled += drained.len() as u64;
            drained
        };

        if !drained.is_empty() {
            warn!(
                cancelled = drained.len(),
                "OperationQueue::shutdown: cancelling pending operations"
            );
        }
        for op in drained {
            (op.abort)();
        }

        self.shared.notify.notify_waiters();
    }

    /// Snapshot of occupancy and counters
    pub fn queue_state(&self) -> QueueState {
        let inner = self.shared.lock_inner();
        QueueState {
            running: inner.running,
            pending: inner.pending.len(),
            held_keys: inner.locks.len(),
            shutdown: inner.shutdown,
            stats: inner.stats.clone(),
        }
    }

    /// Lifetime counters
    pub fn stats(&self) -> QueueStats {
        self.shared.lock_inner().stats.clone()
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        self.shutdown();
        self.workers.clear();
    }
}

impl Shared {
    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("coordination lock poisoned")
    }

    /// Pre-start cancellation: remove from the admission queue and resolve
    /// Cancelled. A no-op if the operation already started or finished; the
    /// running work observes its own signal clone.
    fn cancel_pending(&self, seq: u64) {
        let removed = {
            let mut inner = self.lock_inner();
            let removed = inner.pending.remove(seq);
            if removed.is_some() {
                inner.stats.total_cancelled += 1;
            }
            removed
        };

        if let Some(op) = removed {
            debug!(seq, "cancelled while pending, work never ran");
            (op.abort)();
            self.notify.notify_one();
        }
    }

    /// One short atomic step: select the next admissible operation and
    /// acquire its key lock. Execution happens outside the lock.
    fn next_step(&self) -> Step {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;

        if inner.shutdown {
            return Step::Exit;
        }

        let Some(op) = inner.pending.select_next(&inner.locks) else {
            return Step::Idle;
        };

        // Backstop for the submit/cancel race window
        if op.signal.as_ref().is_some_and(CancellationSignal::is_cancelled) {
            inner.stats.total_cancelled += 1;
            return Step::Cancel(op);
        }

        if let Some(key) = op.key.as_deref() {
            if !inner.locks.try_acquire(key, op.seq) {
                // Lost the key between selection and acquisition; the
                // original sequence number puts it back at the front of
                // its priority band
                inner.pending.restore(op);
                return Step::Idle;
            }
        }

        inner.running += 1;
        inner.stats.peak_running = inner.stats.peak_running.max(inner.running);
        Step::Run(op)
    }

    /// Release the key, publish completion, wake a worker that may now have
    /// admissible work
    fn complete(&self, seq: u64, key: Option<&str>) {
        {
            let mut inner = self.lock_inner();
            if let Some(key) = key {
                if let Err(violation) = inner.locks.release(key, seq) {
                    drop(inner);
                    panic!("{violation}");
                }
            }
            inner.running -= 1;
            inner.stats.total_completed += 1;
        }
        self.notify.notify_one();
    }
}

/// Deliver a terminal outcome, escalating double delivery to a fatal error
fn deliver<T, E>(slot: &ResultSlot<T, E>, outcome: Outcome<T, E>) {
    if let Err(violation) = slot.deliver(outcome) {
        panic!("{violation}");
    }
}

/// Worker loop: one per concurrency slot
async fn worker_loop(shared: Arc<Shared>, worker: usize) {
    debug!(worker, "worker_loop: started");
    loop {
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        // Register interest before checking for work so a submission,
        // key release, cancellation, or shutdown between the check and the
        // await still wakes this worker. Spurious wakeups just loop.
        notified.as_mut().enable();

        match shared.next_step() {
            Step::Run(op) => {
                debug!(
                    worker,
                    seq = op.seq,
                    priority = op.priority,
                    key = ?op.key,
                    "worker_loop: executing operation"
                );
                let PendingOp { seq, key, run, .. } = op;
                run.await;
                shared.complete(seq, key.as_deref());
            }
            Step::Cancel(op) => {
                debug!(worker, seq = op.seq, "worker_loop: resolving cancelled operation");
                (op.abort)();
            }
            Step::Idle => notified.await,
            Step::Exit => break,
        }
    }
    debug!(worker, "worker_loop: stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = OperationQueue::new(QueueConfig::with_concurrency(0));
        assert!(matches!(result, Err(QueueError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_submit_success() {
        let queue = OperationQueue::new(QueueConfig::default()).unwrap();
        let handle = queue
            .submit::<i32, String, _>(0, None, None, async { Outcome::Success(42) })
            .unwrap();
        assert_eq!(handle.outcome().await, Outcome::Success(42));
    }

    #[tokio::test]
    async fn test_failure_forwarded_verbatim() {
        let queue = OperationQueue::new(QueueConfig::default()).unwrap();
        let handle = queue
            .submit::<i32, String, _>(0, None, None, async {
                Outcome::Failure("remote call exploded".to_string())
            })
            .unwrap();
        assert_eq!(
            handle.outcome().await,
            Outcome::Failure("remote call exploded".to_string())
        );
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_rejected() {
        let queue = OperationQueue::new(QueueConfig::default()).unwrap();
        queue.shutdown();

        let result = queue.submit::<i32, String, _>(0, None, None, async { Outcome::Success(1) });
        assert!(matches!(result, Err(QueueError::Shutdown)));
    }

    #[tokio::test]
    async fn test_already_fired_signal_never_runs_work() {
        let queue = OperationQueue::new(QueueConfig::default()).unwrap();
        let signal = CancellationSignal::new();
        signal.cancel();

        let ran = Arc::new(AtomicUsize::new(0));
        let work_ran = Arc::clone(&ran);
        let handle = queue
            .submit::<(), String, _>(0, None, Some(signal), async move {
                work_ran.fetch_add(1, Ordering::SeqCst);
                Outcome::Success(())
            })
            .unwrap();

        assert_eq!(handle.outcome().await, Outcome::Cancelled);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_resolves_pending_as_cancelled() {
        let queue = OperationQueue::new(QueueConfig::with_concurrency(1)).unwrap();

        // Occupy the only worker so the next submission stays pending
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let plug = queue
            .submit::<(), String, _>(100, None, None, async move {
                let _ = release_rx.await;
                Outcome::Success(())
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending = queue
            .submit::<(), String, _>(0, None, None, async { Outcome::Success(()) })
            .unwrap();

        queue.shutdown();
        assert_eq!(pending.outcome().await, Outcome::Cancelled);

        // Running work still finishes cooperatively
        release_tx.send(()).unwrap();
        assert_eq!(plug.outcome().await, Outcome::Success(()));
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let queue = OperationQueue::new(QueueConfig::default()).unwrap();

        let a = queue
            .submit::<(), String, _>(0, None, None, async { Outcome::Success(()) })
            .unwrap();
        let b = queue
            .submit::<(), String, _>(0, None, None, async { Outcome::Success(()) })
            .unwrap();
        a.outcome().await;
        b.outcome().await;

        let stats = queue.stats();
        assert_eq!(stats.total_submitted, 2);
        assert_eq!(stats.total_completed, 2);
        assert_eq!(stats.total_cancelled, 0);
    }

    #[tokio::test]
    async fn test_queue_state_snapshot() {
        let queue = OperationQueue::new(QueueConfig::with_concurrency(1)).unwrap();

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let plug = queue
            .submit::<(), String, _>(0, Some("key"), None, async move {
                let _ = release_rx.await;
                Outcome::Success(())
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let state = queue.queue_state();
        assert_eq!(state.running, 1);
        assert_eq!(state.held_keys, 1);
        assert!(!state.shutdown);

        release_tx.send(()).unwrap();
        plug.outcome().await;
    }
}
