//! Cooperative cancellation signal
//!
//! A `CancellationSignal` is a single-writer, multi-reader fired flag. The
//! caller keeps one clone and hands another to the queue at submission; the
//! work future may hold a third and poll it at its own suspension points.
//! Firing the signal while the operation is still pending removes it from the
//! queue before its work ever runs; firing mid-flight only requests that the
//! work unwind voluntarily.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

type CancelHook = Box<dyn FnOnce() + Send>;

/// Observable cancellation flag shared between a caller, the queue, and the
/// work future.
#[derive(Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<SignalInner>,
}

#[derive(Default)]
struct SignalInner {
    fired: AtomicBool,
    notify: Notify,
    hooks: Mutex<Vec<CancelHook>>,
}

impl CancellationSignal {
    /// Create a new, unfired signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Idempotent; only the first call runs registered
    /// hooks and wakes observers.
    pub fn cancel(&self) {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("CancellationSignal::cancel: fired");

        let hooks = {
            let mut hooks = self
                .inner
                .hooks
                .lock()
                .expect("cancellation hook lock poisoned");
            std::mem::take(&mut *hooks)
        };
        for hook in hooks {
            hook();
        }

        self.inner.notify.notify_waiters();
    }

    /// Whether the signal has fired
    pub fn is_cancelled(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Resolve once the signal fires. Resolves immediately if already fired;
    /// any number of readers may wait.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking so a concurrent cancel() cannot
            // slip between the check and the await
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Fire the signal after `delay`. Timeout support is just a timer on the
    /// same cancellation path, not a separate mechanism.
    pub fn cancel_after(&self, delay: Duration) {
        debug!(?delay, "CancellationSignal::cancel_after: timer armed");
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            signal.cancel();
        });
    }

    /// Register a hook that runs when the signal fires. Runs synchronously
    /// inside `cancel()`, or immediately if the signal already fired.
    pub(crate) fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        if self.is_cancelled() {
            hook();
            return;
        }

        let mut hooks = self
            .inner
            .hooks
            .lock()
            .expect("cancellation hook lock poisoned");
        // Re-check under the lock: cancel() takes the hook list under this
        // same lock, so either it sees our hook or we see the fired flag
        if self.is_cancelled() {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(Box::new(hook));
    }
}

impl std::fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("fired", &self.is_cancelled())
            .finish()
    }
}
