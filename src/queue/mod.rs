//! Per-branch merge queues.
//!
//! Three layers, each building on the one below:
//!
//! - [`builder`] turns a branch's cached snapshots into a deterministically
//!   ordered candidate list.
//! - [`actions`] is the merge state machine: one validated candidate in,
//!   exactly one action out.
//! - [`scheduler`] ties them together: build the queue, re-validate the
//!   front candidate against live state, and act on at most one pull per
//!   pass.

pub mod actions;
pub mod builder;
pub mod scheduler;

pub use actions::{ActionOutcome, QueueAction, classify};
pub use builder::{build, sort_snapshots};
pub use scheduler::{PassContext, run_pass};
