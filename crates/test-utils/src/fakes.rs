#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use vgrid_events::access::AccessPolicy;
use vgrid_events::engine::EngineBackends;
use vgrid_events::errors::{Result, TriggerError};
use vgrid_events::exec::{
    BoxFuture, CommandBackend, CommandContext, CommandOp, CommandOutcome, JobBackend, JobReceipt,
};
use vgrid_events::fs::FileSystem;
use vgrid_events::watch::WatchService;

/// Watch service that only remembers what it was asked to watch.
#[derive(Debug, Default)]
pub struct RecordingWatchService {
    watched: Mutex<HashSet<PathBuf>>,
    added: Mutex<Vec<(PathBuf, bool)>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl RecordingWatchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `add_watch` fail for `path`.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.failing.lock().unwrap().insert(path.into());
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.watched.lock().unwrap().iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Every `add_watch` call in order, with its recursive flag.
    pub fn added(&self) -> Vec<(PathBuf, bool)> {
        self.added.lock().unwrap().clone()
    }
}

impl WatchService for RecordingWatchService {
    fn add_watch(&self, path: &Path, recursive: bool) -> Result<()> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(TriggerError::Other(anyhow::anyhow!(
                "cannot watch {}",
                path.display()
            )));
        }
        self.added
            .lock()
            .unwrap()
            .push((path.to_path_buf(), recursive));
        self.watched.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn remove_watch(&self, path: &Path) {
        self.watched.lock().unwrap().remove(path);
    }

    fn is_watched(&self, path: &Path) -> bool {
        self.watched.lock().unwrap().contains(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub op: CommandOp,
    pub args: Vec<String>,
    pub ctx: CommandContext,
}

/// Command backend that records calls and answers with a fixed status.
#[derive(Debug, Default)]
pub struct RecordingCommandBackend {
    calls: Mutex<Vec<RecordedCommand>>,
    exit_status: AtomicI32,
}

impl RecordingCommandBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_exit_status(&self, status: i32) {
        self.exit_status.store(status, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandBackend for RecordingCommandBackend {
    fn run<'a>(
        &'a self,
        op: CommandOp,
        args: Vec<String>,
        ctx: &'a CommandContext,
    ) -> BoxFuture<'a, Result<CommandOutcome>> {
        Box::pin(async move {
            let output = format!("{op} {}", args.join(" "));
            self.calls.lock().unwrap().push(RecordedCommand {
                op,
                args,
                ctx: ctx.clone(),
            });
            Ok(CommandOutcome {
                exit_status: self.exit_status.load(Ordering::SeqCst),
                output,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub description: String,
    pub owner: String,
}

/// Job backend that records submissions; can be switched to refuse them.
#[derive(Debug, Default)]
pub struct RecordingJobBackend {
    jobs: Mutex<Vec<SubmittedJob>>,
    failing: AtomicBool,
}

impl RecordingJobBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn jobs(&self) -> Vec<SubmittedJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl JobBackend for RecordingJobBackend {
    fn submit<'a>(
        &'a self,
        description: String,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<JobReceipt>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TriggerError::JobError("batch system unavailable".to_string()));
            }
            let mut jobs = self.jobs.lock().unwrap();
            let job_id = format!("job-{}", jobs.len() + 1);
            jobs.push(SubmittedJob {
                description,
                owner: owner.to_string(),
            });
            Ok(JobReceipt {
                message: format!("{job_id} accepted"),
                job_id,
            })
        })
    }
}

/// Access policy denying a fixed set of users everywhere.
#[derive(Debug, Default)]
pub struct DenyUsers {
    denied: HashSet<String>,
}

impl DenyUsers {
    pub fn new(users: &[&str]) -> Self {
        Self {
            denied: users.iter().map(|u| u.to_string()).collect(),
        }
    }
}

impl AccessPolicy for DenyUsers {
    fn has_access(&self, user: &str, _workspace: &str) -> bool {
        !self.denied.contains(user)
    }
}

/// The recording fakes behind one engine, kept around for assertions.
#[derive(Debug, Clone)]
pub struct Fakes {
    pub watch: Arc<RecordingWatchService>,
    pub commands: Arc<RecordingCommandBackend>,
    pub jobs: Arc<RecordingJobBackend>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            watch: Arc::new(RecordingWatchService::new()),
            commands: Arc::new(RecordingCommandBackend::new()),
            jobs: Arc::new(RecordingJobBackend::new()),
        }
    }

    /// Engine backends over `fs` using these fakes and `access`.
    pub fn backends(&self, fs: Arc<dyn FileSystem>, access: Arc<dyn AccessPolicy>) -> EngineBackends {
        EngineBackends {
            fs,
            watch: self.watch.clone(),
            access,
            commands: self.commands.clone(),
            jobs: self.jobs.clone(),
        }
    }
}

impl Default for Fakes {
    fn default() -> Self {
        Self::new()
    }
}
