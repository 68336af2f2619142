//! Execution orchestration over the fork simulator.
//!
//! An [`ExecutionArray`] is the ordered, observable state machine of one
//! user intent's operations. The [`ExecutionRunner`] plans it (sequential
//! simulation on one fork) and runs it (real submission through an
//! external [`Submitter`]), and the [`ProgressBroadcaster`] fans every
//! state change out to session- and execution-scoped subscribers.

pub mod array;
pub mod broadcast;
pub mod item;
pub mod runner;

pub use array::{
    ArrayError, ExecutionArray, ExecutionArrayState, ProgressEvent, ProgressSubscription,
};
pub use broadcast::ProgressBroadcaster;
pub use item::{ExecutionItem, ExecutionKind, ExecutionStatus, RetryPolicy};
pub use runner::{ExecutionRunner, RunReport, Submitter};
