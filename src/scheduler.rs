//! Request scheduling: rate-limited dispatch, execution and retry control.
//!
//! Two bounded channels connect the pieces. The controller feeds
//! [`Submission`](crate::types::Submission)s into the dispatcher's input; the
//! dispatcher launches executor tasks that each deliver one
//! [`UnitResult`](crate::types::UnitResult) on the output the controller drains.

pub mod controller;
pub mod dispatcher;
pub mod executor;
pub mod retry;

pub use controller::{Controller, ControllerReport, UnitState};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use executor::Executor;
pub use retry::RetryPolicy;

/// Default capacity of the result channel.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 10;

/// Input capacity large enough that the controller never blocks on
/// re-submission.
pub fn input_capacity(pending: usize) -> usize {
    pending.max(1) * 2
}
