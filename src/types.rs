use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Name of a workspace relative to the workspace home, e.g. `"Project"` or
/// `"Project/Sub"`.
pub type WorkspaceName = String;

/// Rule identifier, unique within one workspace.
pub type RuleId = String;

/// Seconds since the unix epoch.
pub type Timestamp = f64;

/// Name of the root monitor that picks up workspaces created after startup.
pub const ROOT_WORKSPACE: &str = ".";

/// Kind of filesystem change a rule can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Created,
    Modified,
    Deleted,
}

impl Change {
    pub const ALL: [Change; 3] = [Change::Created, Change::Modified, Change::Deleted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Change::Created => "created",
            Change::Modified => "modified",
            Change::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Change {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(Change::Created),
            "modified" => Ok(Change::Modified),
            "deleted" => Ok(Change::Deleted),
            other => Err(format!(
                "invalid change: {other} (expected \"created\", \"modified\" or \"deleted\")"
            )),
        }
    }
}

/// Current wall clock time as epoch seconds.
pub fn now_secs() -> Timestamp {
    system_time_secs(SystemTime::now())
}

/// Convert a `SystemTime` into epoch seconds (negative before 1970).
pub fn system_time_secs(t: SystemTime) -> Timestamp {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}
