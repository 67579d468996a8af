//! Queue error types

use thiserror::Error;

/// Errors surfaced synchronously at construction or submission time
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue has been shut down and accepts no new work
    #[error("Queue is shut down")]
    Shutdown,

    /// Configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl QueueError {
    /// Check if this is a shutdown rejection
    pub fn is_shutdown(&self) -> bool {
        matches!(self, QueueError::Shutdown)
    }
}

/// Internal bugs that must never occur in correct operation.
///
/// Narrow internal APIs return these so tests can observe the flag;
/// the dispatcher escalates them to a panic rather than recovering.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("Outcome already delivered for operation {seq}")]
    DoubleDelivery { seq: u64 },

    #[error("Key '{key}' released while not held")]
    ReleaseNotHeld { key: String },

    #[error("Key '{key}' released by operation {releaser} but held by operation {holder}")]
    ReleaseWrongHolder { key: String, holder: u64, releaser: u64 },
}
