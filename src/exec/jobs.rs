// src/exec/jobs.rs

//! Default job backend and the pending-job records written after a
//! successful `submit`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use blake3::Hasher;
use serde::Serialize;
use tracing::info;

use crate::errors::{Result, TriggerError};
use crate::exec::backend::{BoxFuture, JobBackend, JobReceipt};
use crate::fs::FileSystem;
use crate::rules::TriggerRule;
use crate::types::{Change, Timestamp, now_secs};
use crate::watch::event::Event;

/// Directory (below the workspace home) holding pending-job records.
pub const PENDING_STATES_DIR: &str = ".trigger_jobs/pending_states";

/// Drops job descriptions into a spool directory for an external batch
/// system to pick up.
#[derive(Debug, Clone)]
pub struct SpoolJobBackend {
    fs: Arc<dyn FileSystem>,
    spool_dir: PathBuf,
}

impl SpoolJobBackend {
    pub fn new(fs: Arc<dyn FileSystem>, spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            spool_dir: spool_dir.into(),
        }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }
}

/// Job ids are derived from owner, description and submission time so a
/// resubmission of the same template still gets a fresh id.
pub fn make_job_id(owner: &str, description: &str, submitted: Timestamp) -> String {
    let mut hasher = Hasher::new();
    hasher.update(owner.as_bytes());
    hasher.update(&[0]);
    hasher.update(description.as_bytes());
    hasher.update(&submitted.to_le_bytes());
    let hex = hasher.finalize().to_hex();
    format!("{}_{}", submitted as u64, &hex[..16])
}

impl JobBackend for SpoolJobBackend {
    fn submit<'a>(
        &'a self,
        description: String,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<JobReceipt>> {
        Box::pin(async move {
            if description.trim().is_empty() {
                return Err(TriggerError::JobError("empty job description".to_string()));
            }
            let job_id = make_job_id(owner, &description, now_secs());
            let path = self.spool_dir.join(format!("{job_id}.job"));
            let body = format!("# owner: {owner}\n{description}");
            self.fs
                .write(&path, body.as_bytes())
                .map_err(|e| TriggerError::JobError(format!("{e:#}")))?;
            info!(job_id = %job_id, owner, path = %path.display(), "job spooled");
            Ok(JobReceipt {
                message: format!("job {job_id} queued"),
                job_id,
            })
        })
    }
}

/// The event that caused a submission, as stored in the pending record.
#[derive(Debug, Clone, Serialize)]
pub struct PendingEvent {
    pub src_path: String,
    pub time_stamp: Timestamp,
    pub event_type: Change,
    pub is_directory: bool,
}

impl From<&Event> for PendingEvent {
    fn from(event: &Event) -> Self {
        Self {
            src_path: event.path.to_string_lossy().into_owned(),
            time_stamp: event.timestamp.unwrap_or_default(),
            event_type: event.change,
            is_directory: event.is_directory,
        }
    }
}

/// Links a submitted job back to the rule and event that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct PendingJobRecord<'a> {
    pub job_id: &'a str,
    pub owner: &'a str,
    pub event: PendingEvent,
    pub rule: &'a TriggerRule,
}

impl PendingJobRecord<'_> {
    /// Persist as TOML below `workspace_home`; returns the record path.
    pub fn write(&self, fs: &dyn FileSystem, workspace_home: &Path) -> Result<PathBuf> {
        let path = workspace_home.join(PENDING_STATES_DIR).join(self.job_id);
        let text = toml::to_string(self)?;
        fs.write(&path, text.as_bytes())?;
        Ok(path)
    }
}
