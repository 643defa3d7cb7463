// src/access.rs

//! Workspace membership checks for a rule's `run_as` identity.
//!
//! Rules keep running only while their owner still belongs to the
//! workspace. Membership is read from `members.toml` in each workspace home
//! and is inherited from parent workspaces.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::fs::FileSystem;

pub const MEMBERS_FILE_NAME: &str = "members.toml";

pub trait AccessPolicy: Send + Sync + Debug {
    fn has_access(&self, user: &str, workspace: &str) -> bool;
}

/// Grants everything. Used when membership is managed elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn has_access(&self, _user: &str, _workspace: &str) -> bool {
        true
    }
}

#[derive(Debug, Default, Deserialize)]
struct MembersFile {
    #[serde(default)]
    owners: Vec<String>,
    #[serde(default)]
    members: Vec<String>,
}

/// Reads `<workspace_home>/<ws>/members.toml` on every check, so membership
/// changes apply without reloading rules.
#[derive(Debug, Clone)]
pub struct MembershipAccess {
    fs: Arc<dyn FileSystem>,
    workspace_home: PathBuf,
}

impl MembershipAccess {
    pub fn new(fs: Arc<dyn FileSystem>, workspace_home: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            workspace_home: workspace_home.into(),
        }
    }

    fn listed_in(&self, user: &str, workspace: &str) -> bool {
        let path = self.workspace_home.join(workspace).join(MEMBERS_FILE_NAME);
        let Ok(text) = self.fs.read_to_string(&path) else {
            return false;
        };
        match toml::from_str::<MembersFile>(&text) {
            Ok(file) => file
                .owners
                .iter()
                .chain(file.members.iter())
                .any(|m| m == user),
            Err(err) => {
                debug!(workspace, error = %err, "unreadable members file");
                false
            }
        }
    }
}

impl AccessPolicy for MembershipAccess {
    fn has_access(&self, user: &str, workspace: &str) -> bool {
        let mut current = workspace.trim_matches('/');
        loop {
            if current.is_empty() {
                return false;
            }
            if self.listed_in(user, current) {
                return true;
            }
            match current.rsplit_once('/') {
                Some((parent, _)) => current = parent,
                None => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn membership_is_inherited_from_parent() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file(
            "/home/Project/members.toml",
            "owners = [\"alice\"]\nmembers = [\"bob\"]\n",
        );
        fs.add_dir("/home/Project/Sub");
        let access = MembershipAccess::new(fs, "/home");

        assert!(access.has_access("bob", "Project"));
        assert!(access.has_access("alice", "Project/Sub"));
        assert!(!access.has_access("carol", "Project/Sub"));
        assert!(!access.has_access("alice", "Project-Management"));
    }
}
