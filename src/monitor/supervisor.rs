// src/monitor/supervisor.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::monitor::workspace::WorkspaceMonitor;
use crate::types::ROOT_WORKSPACE;

/// Top-level workspaces: directories present under both the workspace home
/// and the data root. Hidden directories are skipped.
pub fn discover_workspaces(fs: &dyn FileSystem, config: &ConfigFile) -> Vec<String> {
    let Ok(entries) = fs.read_dir(&config.paths.workspace_home) else {
        warn!(home = %config.paths.workspace_home.display(), "cannot list workspace home");
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .into_iter()
        .filter(|path| fs.is_dir(path))
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|name| !name.starts_with('.'))
        .filter(|name| fs.is_dir(&config.paths.data_root.join(name)))
        .collect();
    names.sort();
    names
}

/// Runs one monitor task per workspace and stops them all on Ctrl-C.
#[derive(Debug)]
pub struct Supervisor {
    config: Arc<ConfigFile>,
    fs: Arc<dyn FileSystem>,
}

impl Supervisor {
    pub fn new(config: Arc<ConfigFile>, fs: Arc<dyn FileSystem>) -> Self {
        Self { config, fs }
    }

    /// Monitors to start: just `only` when given, else the root monitor
    /// plus every discovered workspace.
    pub fn workspaces(&self, only: Option<String>) -> Vec<String> {
        match only {
            Some(name) => vec![name],
            None => {
                let mut names = vec![ROOT_WORKSPACE.to_string()];
                names.extend(discover_workspaces(self.fs.as_ref(), &self.config));
                names
            }
        }
    }

    pub async fn run(self, only: Option<String>) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut monitors = JoinSet::new();

        for workspace in self.workspaces(only) {
            let span = info_span!("monitor", workspace = %workspace);
            let config = Arc::clone(&self.config);
            let shutdown = shutdown_rx.clone();
            monitors.spawn(
                async move {
                    let result = match WorkspaceMonitor::production(config, &workspace) {
                        Ok(monitor) => monitor.run(shutdown).await,
                        Err(err) => Err(err),
                    };
                    if let Err(err) = &result {
                        error!(error = %err, "monitor failed");
                    }
                    (workspace, result.is_ok())
                }
                .instrument(span),
            );
        }
        info!(monitors = monitors.len(), "supervisor started");

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut listening = true;
        loop {
            tokio::select! {
                res = &mut ctrl_c, if listening => match res {
                    Ok(()) => {
                        info!("shutdown requested");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "cannot listen for Ctrl-C");
                        listening = false;
                    }
                },
                joined = monitors.join_next() => match joined {
                    Some(res) => log_monitor_exit(res),
                    None => {
                        info!("all monitors stopped");
                        return Ok(());
                    }
                },
            }
        }

        let _ = shutdown_tx.send(true);
        let grace = Duration::from_secs(self.config.engine.shutdown_grace_secs) + Duration::from_secs(1);
        let drained = tokio::time::timeout(grace, async {
            while let Some(res) = monitors.join_next().await {
                log_monitor_exit(res);
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = monitors.len(), "monitors did not stop in time; aborting");
            monitors.abort_all();
            while monitors.join_next().await.is_some() {}
        }
        info!("supervisor stopped");
        Ok(())
    }
}

fn log_monitor_exit(res: std::result::Result<(String, bool), JoinError>) {
    match res {
        Ok((workspace, true)) => info!(%workspace, "monitor exited"),
        Ok((workspace, false)) => warn!(%workspace, "monitor exited with an error"),
        Err(err) if err.is_panic() => error!(error = %err, "monitor panicked"),
        Err(err) => warn!(error = %err, "monitor task cancelled"),
    }
}
