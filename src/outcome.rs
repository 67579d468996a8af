//! Terminal outcomes and the per-operation result channel

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::error::InvariantViolation;

/// Terminal outcome of one operation.
///
/// Cancellation is a first-class value, not an error: callers branch on it
/// explicitly instead of matching on error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The work ran to completion and produced a value
    Success(T),
    /// The work ran and failed; the error is forwarded verbatim
    Failure(E),
    /// The operation was cancelled, either before it started or by the work
    /// honoring its signal mid-flight
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// The success value, if any
    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The failure payload, if any
    pub fn failure(self) -> Option<E> {
        match self {
            Outcome::Failure(err) => Some(err),
            _ => None,
        }
    }

    /// Collapse into a `Result`, mapping `Cancelled` through `cancelled`
    pub fn into_result(self, cancelled: impl FnOnce() -> E) -> Result<T, E> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(err) => Err(err),
            Outcome::Cancelled => Err(cancelled()),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        }
    }
}

/// Caller-side handle observing the terminal outcome of one submission
pub struct OperationHandle<T, E> {
    rx: oneshot::Receiver<Outcome<T, E>>,
}

impl<T, E> OperationHandle<T, E> {
    /// Wait for the terminal outcome.
    ///
    /// A queue dropped or shut down before delivery resolves `Cancelled`.
    pub async fn outcome(self) -> Outcome<T, E> {
        self.rx.await.unwrap_or(Outcome::Cancelled)
    }
}

/// Single-writer slot backing one operation's result channel.
///
/// Exactly one terminal value may pass through; a second delivery is an
/// [`InvariantViolation`], never silently dropped.
pub(crate) struct ResultSlot<T, E> {
    seq: u64,
    tx: Mutex<Option<oneshot::Sender<Outcome<T, E>>>>,
}

impl<T, E> ResultSlot<T, E> {
    /// Create the slot and the handle observing it
    pub(crate) fn channel(seq: u64) -> (Arc<Self>, OperationHandle<T, E>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            seq,
            tx: Mutex::new(Some(tx)),
        });
        (slot, OperationHandle { rx })
    }

    /// Deliver the terminal outcome. A handle that stopped listening is
    /// fine; a slot that already delivered is not.
    pub(crate) fn deliver(&self, outcome: Outcome<T, E>) -> Result<(), InvariantViolation> {
        let tx = self
            .tx
            .lock()
            .expect("result slot lock poisoned")
            .take();
        match tx {
            Some(tx) => {
                // Receiver dropped means the caller no longer cares; the
                // delivery itself still happened exactly once
                let _ = tx.send(outcome);
                Ok(())
            }
            None => Err(InvariantViolation::DoubleDelivery { seq: self.seq }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        let success: Outcome<i32, String> = Outcome::Success(1);
        let failure: Outcome<i32, String> = Outcome::Failure("boom".to_string());
        let cancelled: Outcome<i32, String> = Outcome::Cancelled;

        assert!(success.is_success());
        assert!(failure.is_failure());
        assert!(cancelled.is_cancelled());
        assert!(!success.is_cancelled());
    }

    #[test]
    fn test_outcome_accessors() {
        let success: Outcome<i32, String> = Outcome::Success(42);
        assert_eq!(success.success(), Some(42));

        let failure: Outcome<i32, String> = Outcome::Failure("boom".to_string());
        assert_eq!(failure.failure(), Some("boom".to_string()));

        let cancelled: Outcome<i32, String> = Outcome::Cancelled;
        assert_eq!(cancelled.success(), None);
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: Outcome<i32, String> = Ok(5).into();
        assert_eq!(ok, Outcome::Success(5));

        let err: Outcome<i32, String> = Err("bad".to_string()).into();
        assert_eq!(err, Outcome::Failure("bad".to_string()));
    }

    #[test]
    fn test_into_result_maps_cancelled() {
        let cancelled: Outcome<i32, String> = Outcome::Cancelled;
        assert_eq!(
            cancelled.into_result(|| "cancelled".to_string()),
            Err("cancelled".to_string())
        );

        let success: Outcome<i32, String> = Outcome::Success(3);
        assert_eq!(success.into_result(|| "cancelled".to_string()), Ok(3));
    }

    #[tokio::test]
    async fn test_slot_delivers_once() {
        let (slot, handle) = ResultSlot::<i32, String>::channel(1);
        assert!(slot.deliver(Outcome::Success(10)).is_ok());
        assert_eq!(handle.outcome().await, Outcome::Success(10));
    }

    #[tokio::test]
    async fn test_second_delivery_is_violation() {
        let (slot, _handle) = ResultSlot::<i32, String>::channel(9);
        slot.deliver(Outcome::Success(1)).unwrap();

        assert_eq!(
            slot.deliver(Outcome::Cancelled),
            Err(InvariantViolation::DoubleDelivery { seq: 9 })
        );
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_violate() {
        let (slot, handle) = ResultSlot::<i32, String>::channel(2);
        drop(handle);
        assert!(slot.deliver(Outcome::Success(1)).is_ok());
    }

    #[tokio::test]
    async fn test_dropped_slot_resolves_cancelled() {
        let (slot, handle) = ResultSlot::<i32, String>::channel(3);
        drop(slot);
        assert_eq!(handle.outcome().await, Outcome::Cancelled);
    }
}
