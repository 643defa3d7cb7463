// src/engine/audit.rs

//! Per-workspace workflow log shown to workspace owners.
//!
//! Separate from daemon tracing output: these lines describe what the
//! owner's rules did (expanded arguments, submitted jobs, broken cycles)
//! and land in `<workspace_home>/<workspace>/.trigger_events.log`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::config::AuditSection;
use crate::fs::FileSystem;

pub const AUDIT_LOG_NAME: &str = ".trigger_events.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditLevel {
    fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warning => "WARNING",
            AuditLevel::Error => "ERROR",
        }
    }
}

/// Size-rotated append-only log, written through the `FileSystem` trait.
#[derive(Debug, Clone)]
pub struct WorkflowLog {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    write_lock: Arc<Mutex<()>>,
}

impl WorkflowLog {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>, audit: &AuditSection) -> Self {
        Self {
            fs,
            path: path.into(),
            max_bytes: audit.max_bytes,
            backups: audit.backups,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, msg: &str) {
        self.write(AuditLevel::Info, msg);
    }

    pub fn warning(&self, msg: &str) {
        self.write(AuditLevel::Warning, msg);
    }

    pub fn error(&self, msg: &str) {
        self.write(AuditLevel::Error, msg);
    }

    /// Audit failures never propagate; they are reported on the daemon log.
    pub fn write(&self, level: AuditLevel, msg: &str) {
        let line = format!(
            "{} {} {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            level.as_str(),
            msg
        );

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.fs.metadata(&self.path).map(|m| m.len).unwrap_or(0);
        if current > 0 && current + line.len() as u64 > self.max_bytes {
            self.rotate();
        }
        if let Err(err) = self.fs.append(&self.path, line.as_bytes()) {
            warn!(path = %self.path.display(), error = %err, "failed to write workflow log");
        }
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&self) {
        if self.backups == 0 {
            if let Err(err) = self.fs.write(&self.path, b"") {
                warn!(path = %self.path.display(), error = %err, "failed to truncate workflow log");
            }
            return;
        }
        for index in (1..self.backups).rev() {
            let from = self.backup_path(index);
            if self.fs.exists(&from) {
                let _ = self.fs.rename(&from, &self.backup_path(index + 1));
            }
        }
        if let Err(err) = self.fs.rename(&self.path, &self.backup_path(1)) {
            warn!(path = %self.path.display(), error = %err, "failed to rotate workflow log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn rotates_when_full_and_keeps_backups() {
        let fs = Arc::new(MockFileSystem::new());
        let audit = AuditSection {
            max_bytes: 64,
            backups: 2,
        };
        let log = WorkflowLog::new(fs.clone(), "/home/Project/.trigger_events.log", &audit);

        for i in 0..6 {
            log.info(&format!("line number {i} with some padding"));
        }

        let current = fs
            .read_to_string(Path::new("/home/Project/.trigger_events.log"))
            .unwrap();
        assert!(current.contains("line number 5"));
        assert!(fs.exists(Path::new("/home/Project/.trigger_events.log.1")));
        assert!(fs.exists(Path::new("/home/Project/.trigger_events.log.2")));
        assert!(!fs.exists(Path::new("/home/Project/.trigger_events.log.3")));
    }

    #[test]
    fn lines_carry_level() {
        let fs = Arc::new(MockFileSystem::new());
        let log = WorkflowLog::new(fs.clone(), "/h/w/.log", &AuditSection::default());
        log.warning("breaking trigger cycle");
        let text = fs.read_to_string(Path::new("/h/w/.log")).unwrap();
        assert!(text.contains(" WARNING breaking trigger cycle"));
    }
}
