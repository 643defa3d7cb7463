// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Daemon configuration as read from a TOML file.
///
/// ```toml
/// [paths]
/// workspace_home = "/srv/vgrid/home"
/// data_root = "/srv/vgrid/files"
/// rule_file_name = "triggers.toml"
/// spool_dir = "/srv/vgrid/spool"
///
/// [engine]
/// max_workers = 64
/// queue_length = 256
///
/// [audit]
/// max_bytes = 16777216
/// backups = 4
/// ```
///
/// Only `[paths]` is required; `[engine]` and `[audit]` have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub paths: PathsSection,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub audit: AuditSection,
}

/// Validated configuration. Constructed through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub paths: PathsSection,
    pub engine: EngineSection,
    pub audit: AuditSection,
}

impl ConfigFile {
    /// Build without validation. Reserved for `validate.rs` and tests that
    /// construct configs programmatically.
    pub fn new_unchecked(paths: PathsSection, engine: EngineSection, audit: AuditSection) -> Self {
        Self {
            paths,
            engine,
            audit,
        }
    }

    /// Home directory of a workspace (holds rule files, caches, logs).
    pub fn workspace_home_of(&self, workspace: &str) -> PathBuf {
        join_workspace(&self.paths.workspace_home, workspace)
    }

    /// Data directory of a workspace (the tree rules match against).
    pub fn data_dir_of(&self, workspace: &str) -> PathBuf {
        join_workspace(&self.paths.data_root, workspace)
    }

    /// Spool directory for the default job backend.
    pub fn spool_dir(&self) -> PathBuf {
        self.paths
            .spool_dir
            .clone()
            .unwrap_or_else(|| self.paths.workspace_home.join(".trigger_spool"))
    }
}

fn join_workspace(base: &std::path::Path, workspace: &str) -> PathBuf {
    if workspace == crate::types::ROOT_WORKSPACE || workspace.is_empty() {
        base.to_path_buf()
    } else {
        base.join(workspace)
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Root of per-workspace home directories (rule files live here).
    pub workspace_home: PathBuf,

    /// Root of per-workspace data directories (watched for triggers).
    pub data_root: PathBuf,

    /// File name of a workspace's rule file.
    #[serde(default = "default_rule_file_name")]
    pub rule_file_name: String,

    /// Where the spool job backend drops job descriptions.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

fn default_rule_file_name() -> String {
    "triggers.toml".to_string()
}

/// `[engine]` section: tuning knobs for the dispatcher and worker pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// How long a "no rule matched" verdict is trusted.
    pub miss_cache_ttl_secs: f64,

    /// Size at which the miss cache is swept for expired entries.
    pub miss_cache_expire_size: usize,

    /// Concurrent action slots per workspace.
    pub max_workers: usize,

    /// Capacity of the bounded job queue.
    pub queue_length: usize,

    /// Initial backoff when the job queue is full.
    pub submit_backoff_ms: u64,

    /// A modification is considered real when the mtime is this close to
    /// the event timestamp.
    pub atime_slack_secs: f64,

    /// Interval of the lazy activation check.
    pub activation_poll_secs: u64,

    /// Time in-flight jobs get to finish on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            miss_cache_ttl_secs: 60.0,
            miss_cache_expire_size: 10_000,
            max_workers: 64,
            queue_length: 256,
            submit_backoff_ms: 50,
            atime_slack_secs: 2.0,
            activation_poll_secs: 60,
            shutdown_grace_secs: 5,
        }
    }
}

/// `[audit]` section: per-workspace event log rotation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    pub max_bytes: u64,
    pub backups: usize,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024 * 1024,
            backups: 4,
        }
    }
}
