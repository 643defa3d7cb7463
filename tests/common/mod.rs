#![allow(dead_code)]

pub use vgrid_events_test_utils::builders;
pub use vgrid_events_test_utils::fakes::{self, Fakes};
pub use vgrid_events_test_utils::{init_tracing, with_timeout};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use vgrid_events::access::{AccessPolicy, AllowAll};
use vgrid_events::config::ConfigFile;
use vgrid_events::engine::TriggerEngine;
use vgrid_events::fs::FileSystem;
use vgrid_events::fs::mock::MockFileSystem;
use vgrid_events::rules::TriggerRule;

/// Engine for `workspace` over a mock filesystem with recording fakes.
pub fn engine_with_rules(
    fs: &Arc<MockFileSystem>,
    config: ConfigFile,
    workspace: &str,
    rules: Vec<TriggerRule>,
) -> (Arc<TriggerEngine>, Fakes) {
    engine_with_access(fs, config, workspace, rules, Arc::new(AllowAll))
}

pub fn engine_with_access(
    fs: &Arc<MockFileSystem>,
    config: ConfigFile,
    workspace: &str,
    rules: Vec<TriggerRule>,
    access: Arc<dyn AccessPolicy>,
) -> (Arc<TriggerEngine>, Fakes) {
    let fakes = Fakes::new();
    let fs: Arc<dyn FileSystem> = fs.clone();
    let engine = TriggerEngine::new(Arc::new(config), workspace, fakes.backends(fs, access));
    engine.reload_rules(workspace, rules);
    (engine, fakes)
}

/// Read a file from the mock filesystem, empty when missing.
pub fn read(fs: &MockFileSystem, path: &str) -> String {
    fs.read_to_string(Path::new(path)).unwrap_or_default()
}

/// Poll `cond` every 10ms until it holds (5 second timeout).
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    with_timeout(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}
