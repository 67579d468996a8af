//! opqueue - asynchronous priority operation queue
//!
//! Callers submit units of async work tagged with an integer priority and an
//! optional coalescing key; a fixed pool of workers executes them under a
//! bounded concurrency budget.
//!
//! # Core guarantees
//!
//! - **Priority order**: among currently-unblocked pending operations,
//!   selection is strictly priority-then-submission order (FIFO within a
//!   priority band).
//! - **Keyed serialization**: operations sharing a coalescing key never
//!   execute concurrently. A key-blocked high-priority operation is skipped
//!   in favor of lower-priority unblocked work rather than stalling the
//!   queue.
//! - **Cooperative cancellation**: firing a [`CancellationSignal`] before an
//!   operation starts removes it without ever running its work; firing it
//!   mid-flight only requests that the work unwind at its own suspension
//!   points.
//! - **Exactly one outcome**: every accepted submission resolves to exactly
//!   one terminal [`Outcome`] (Success, Failure, or Cancelled).
//!
//! # Example
//!
//! ```
//! use opqueue::{OperationQueue, Outcome, PriorityClass, QueueConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let queue = OperationQueue::new(QueueConfig::default()).unwrap();
//!
//! // Fetches for the same profile never overlap; higher priority runs first
//! let handle = queue
//!     .submit::<i32, String, _>(
//!         PriorityClass::UserInitiated.value(),
//!         Some("profile:42"),
//!         None,
//!         async { Outcome::Success(42) },
//!     )
//!     .unwrap();
//!
//! assert_eq!(handle.outcome().await, Outcome::Success(42));
//! # }
//! ```
//!
//! # Modules
//!
//! - [`core`] - the queue facade and dispatcher worker pool
//! - [`cancel`] - the cooperative cancellation signal
//! - [`outcome`] - terminal outcomes and per-operation result channels
//! - [`config`] - queue configuration
//! - [`priority`] - named priority classes mapped to integer ranks
//! - [`error`] - submission errors and internal invariant violations

pub mod cancel;
pub mod config;
pub mod core;
pub mod error;
pub mod outcome;
pub mod priority;

mod locks;
mod pending;

pub use cancel::CancellationSignal;
pub use config::QueueConfig;
pub use core::{OperationQueue, QueueState, QueueStats};
pub use error::{InvariantViolation, QueueError};
pub use outcome::{OperationHandle, Outcome};
pub use priority::PriorityClass;
