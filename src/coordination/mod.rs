//! Multi-agent coordination
//!
//! - [`Coordinator`] - routes a request, assembles context and runs one of the
//!   four modes (sequential, parallel, collaborative, debate)
//! - [`InteractionLog`] - append-only record of every agent call
//!
//! # Failure semantics
//!
//! A single agent call failure never escapes the coordinator: it is recorded
//! as an interaction with an error marker and left out of synthesis. A request
//! fails only when its final step fails, when every participant fails, on the
//! aggregate timeout, or on cancellation. Failures carry the partial
//! interaction log.

pub mod coordinator;
pub mod log;
mod modes;

pub use coordinator::{
    CoordinationSettings, Coordinator, CoordinatorBuilder, ExecutionPlan, RequestScope,
};
pub use log::{InteractionLog, RequestLog};
