// src/monitor/mod.rs

//! Workspace monitors and the supervisor that runs them.

pub mod supervisor;
pub mod workspace;

pub use supervisor::{Supervisor, discover_workspaces};
pub use workspace::{MonitorChannels, WorkspaceMonitor, find_rule_files};
