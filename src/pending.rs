//! Admission queue: pending operations ordered by priority, then submission

use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;

use crate::cancel::CancellationSignal;
use crate::locks::KeyLockTable;

/// Type-erased work: runs the submitted future and delivers its outcome into
/// the operation's result slot
pub(crate) type WorkFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Type-erased cancellation delivery: resolves the result slot as `Cancelled`
/// without running the work
pub(crate) type AbortFn = Box<dyn FnOnce() + Send>;

/// A submitted-but-not-started operation. Exactly one of `run` or `abort`
/// is ever consumed.
pub(crate) struct PendingOp {
    pub(crate) seq: u64,
    pub(crate) priority: i32,
    pub(crate) key: Option<String>,
    pub(crate) signal: Option<CancellationSignal>,
    pub(crate) run: WorkFuture,
    pub(crate) abort: AbortFn,
}

impl Eq for PendingOp {}

impl PartialEq for PendingOp {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for PendingOp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first, then FIFO within a priority band
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingOp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority/sequence-ordered set of not-yet-dispatched operations
#[derive(Default)]
pub(crate) struct PendingSet {
    heap: BinaryHeap<PendingOp>,
}

impl PendingSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Insert in (priority, sequence) order
    pub(crate) fn insert(&mut self, op: PendingOp) {
        self.heap.push(op);
    }

    /// Remove and return the highest-ranked operation whose key is absent or
    /// not currently locked. Key-blocked entries are skipped, not stalled on,
    /// so a busy key cannot starve unrelated work. Removal is atomic with
    /// selection.
    pub(crate) fn select_next(&mut self, locks: &KeyLockTable) -> Option<PendingOp> {
        let mut blocked = Vec::new();
        let mut selected = None;

        while let Some(op) = self.heap.pop() {
            let key_locked = op.key.as_deref().is_some_and(|key| locks.is_locked(key));
            if key_locked {
                blocked.push(op);
            } else {
                selected = Some(op);
                break;
            }
        }

        for op in blocked {
            self.heap.push(op);
        }
        selected
    }

    /// Return a selected-but-not-started operation. Its original sequence
    /// number puts it back at the front of its priority band.
    pub(crate) fn restore(&mut self, op: PendingOp) {
        self.heap.push(op);
    }

    /// Remove an operation by sequence number (pre-start cancellation)
    pub(crate) fn remove(&mut self, seq: u64) -> Option<PendingOp> {
        let mut removed = None;
        let drained: Vec<PendingOp> = self.heap.drain().collect();
        for op in drained {
            if op.seq == seq {
                removed = Some(op);
            } else {
                self.heap.push(op);
            }
        }
        removed
    }

    /// Remove everything (shutdown drain)
    pub(crate) fn drain(&mut self) -> Vec<PendingOp> {
        self.heap.drain().collect()
    }
}
