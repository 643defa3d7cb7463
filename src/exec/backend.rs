// src/exec/backend.rs

//! Pluggable action backends.
//!
//! The dispatcher talks to a `CommandBackend` and a `JobBackend` instead of
//! touching the filesystem or a batch system directly. Production uses
//! [`BuiltinCommandBackend`](super::command::BuiltinCommandBackend) and
//! [`SpoolJobBackend`](super::jobs::SpoolJobBackend); tests swap in
//! recording fakes.

use std::fmt::Debug;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::errors::Result;
use crate::exec::command::CommandOp;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Who is running a command, and where it is confined to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub workspace: String,
    pub rule_id: String,
    pub run_as: String,
    /// Data directory of the workspace; command paths are relative to it.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_status: i32,
    pub output: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Executes `command` rule actions.
pub trait CommandBackend: Send + Sync + Debug {
    /// Run `op` with already expanded `args` on behalf of `ctx.run_as`.
    fn run<'a>(
        &'a self,
        op: CommandOp,
        args: Vec<String>,
        ctx: &'a CommandContext,
    ) -> BoxFuture<'a, Result<CommandOutcome>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReceipt {
    pub job_id: String,
    pub message: String,
}

/// Receives `submit` rule actions.
pub trait JobBackend: Send + Sync + Debug {
    fn submit<'a>(&'a self, description: String, owner: &'a str)
    -> BoxFuture<'a, Result<JobReceipt>>;
}
