// src/exec/mod.rs

//! Action execution layer.
//!
//! - [`backend`] defines the `CommandBackend` and `JobBackend` traits the
//!   dispatcher calls, so tests can replace them with recording fakes.
//! - [`command`] holds the closed `CommandOp` set and the built-in backend
//!   that performs those operations inside a workspace.
//! - [`jobs`] holds the spool job backend and pending-job records.

pub mod backend;
pub mod command;
pub mod jobs;

pub use backend::{
    BoxFuture, CommandBackend, CommandContext, CommandOutcome, JobBackend, JobReceipt,
};
pub use command::{BuiltinCommandBackend, CommandOp};
pub use jobs::{PendingEvent, PendingJobRecord, SpoolJobBackend};
