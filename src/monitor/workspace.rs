// src/monitor/workspace.rs

//! Lifecycle of one workspace monitor.
//!
//! A monitor owns two watch services: one on the workspace home (rule
//! files) and one on the workspace data tree (trigger events, handed to its
//! [`TriggerEngine`]). Directory watches below the data root are installed
//! lazily, once the workspace has at least one rule targeting it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::access::MembershipAccess;
use crate::config::ConfigFile;
use crate::engine::{EngineBackends, TriggerEngine};
use crate::errors::Result;
use crate::exec::{BuiltinCommandBackend, SpoolJobBackend};
use crate::fs::{FileSystem, RealFileSystem};
use crate::rules::load_rule_file;
use crate::types::{Change, ROOT_WORKSPACE};
use crate::watch::event::Event;
use crate::watch::path_utils::workspace_of_rule_file;
use crate::watch::service::{NotifyWatchService, WatchService};

/// Watch services and the channels they deliver into.
#[derive(Debug)]
pub struct MonitorChannels {
    pub rule_watch: Arc<dyn WatchService>,
    pub rule_rx: mpsc::UnboundedReceiver<Event>,
    pub data_watch: Arc<dyn WatchService>,
    pub data_rx: mpsc::UnboundedReceiver<Event>,
}

impl MonitorChannels {
    /// `notify`-backed watch services for production use.
    pub fn notify() -> Result<Self> {
        let (rule_tx, rule_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        Ok(Self {
            rule_watch: Arc::new(NotifyWatchService::new("rules", rule_tx)?),
            rule_rx,
            data_watch: Arc::new(NotifyWatchService::new("data", data_tx)?),
            data_rx,
        })
    }
}

/// Every file named `rule_file_name` below `dir`, skipping hidden
/// directories. Sorted so parents load before nested workspaces.
pub fn find_rule_files(fs: &dyn FileSystem, dir: &Path, rule_file_name: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = fs.read_dir(&current) else {
            continue;
        };
        for entry in entries {
            let hidden = entry
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if fs.is_dir(&entry) {
                if !hidden {
                    stack.push(entry);
                }
            } else if entry.file_name().is_some_and(|name| name == rule_file_name) {
                found.push(entry);
            }
        }
    }
    found.sort();
    found
}

#[derive(Debug)]
pub struct WorkspaceMonitor {
    workspace: String,
    config: Arc<ConfigFile>,
    engine: Arc<TriggerEngine>,
    fs: Arc<dyn FileSystem>,
    rule_watch: Arc<dyn WatchService>,
    rule_rx: mpsc::UnboundedReceiver<Event>,
    data_rx: mpsc::UnboundedReceiver<Event>,
    activated: bool,
}

impl WorkspaceMonitor {
    /// Monitor with the production backends: real filesystem, notify
    /// watches, membership access, built-in commands and the spool job
    /// backend.
    pub fn production(config: Arc<ConfigFile>, workspace: &str) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let channels = MonitorChannels::notify()?;
        let backends = EngineBackends {
            access: Arc::new(MembershipAccess::new(
                Arc::clone(&fs),
                &config.paths.workspace_home,
            )),
            commands: Arc::new(BuiltinCommandBackend::new(Arc::clone(&fs))),
            jobs: Arc::new(SpoolJobBackend::new(Arc::clone(&fs), config.spool_dir())),
            watch: Arc::clone(&channels.data_watch),
            fs,
        };
        Ok(Self::new(config, workspace, backends, channels))
    }

    /// `backends.watch` must be the same service as `channels.data_watch`.
    pub fn new(
        config: Arc<ConfigFile>,
        workspace: &str,
        backends: EngineBackends,
        channels: MonitorChannels,
    ) -> Self {
        let fs = Arc::clone(&backends.fs);
        let engine = TriggerEngine::new(Arc::clone(&config), workspace, backends);
        Self {
            workspace: workspace.to_string(),
            config,
            engine,
            fs,
            rule_watch: channels.rule_watch,
            rule_rx: channels.rule_rx,
            data_rx: channels.data_rx,
            activated: false,
        }
    }

    pub fn engine(&self) -> &Arc<TriggerEngine> {
        &self.engine
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    fn is_root(&self) -> bool {
        self.workspace == ROOT_WORKSPACE
    }

    fn home_dir(&self) -> PathBuf {
        self.config.workspace_home_of(&self.workspace)
    }

    fn data_dir(&self) -> PathBuf {
        self.config.data_dir_of(&self.workspace)
    }

    /// Install the rule watch and the base data watch. Failure here is
    /// fatal for this workspace.
    pub fn bootstrap(&self) -> Result<()> {
        self.rule_watch.add_watch(&self.home_dir(), !self.is_root())?;
        self.engine
            .backends()
            .watch
            .add_watch(&self.data_dir(), false)?;
        debug!(
            home = %self.home_dir().display(),
            data = %self.data_dir().display(),
            "monitor watches installed"
        );
        Ok(())
    }

    /// Load every rule file of the workspace as if it had just been
    /// modified. The root monitor only learns about workspaces created
    /// while it runs.
    pub fn preload_rules(&mut self) {
        if self.is_root() {
            return;
        }
        let files = find_rule_files(
            self.fs.as_ref(),
            &self.home_dir(),
            &self.config.paths.rule_file_name,
        );
        for file in files {
            self.handle_rule_event(Event::modified(file, false));
        }
    }

    /// Restore the directory cache of a regular workspace.
    pub fn load_dir_cache(&self) {
        if self.is_root() {
            return;
        }
        if let Err(err) = self.engine.dir_cache().load(self.fs.as_ref()) {
            warn!(error = %err, "could not persist regenerated directory cache");
        }
    }

    /// Install all directory watches once the workspace has rules aimed at
    /// its data tree. The root monitor never activates: it only follows
    /// directories created while it runs.
    pub fn try_activate(&mut self) -> bool {
        if self.activated || self.is_root() {
            return self.activated;
        }
        let targets = self.engine.rules().active_targets(&self.data_dir());
        if targets.is_empty() {
            return false;
        }
        let report = {
            let backends = self.engine.backends();
            self.engine
                .dir_cache()
                .activate(self.fs.as_ref(), backends.watch.as_ref())
        };
        info!(targets = targets.len(), watched = report.watched, "workspace activated");
        self.activated = true;
        true
    }

    /// React to a change below the workspace home.
    pub fn handle_rule_event(&mut self, event: Event) {
        if event.is_directory {
            if event.change == Change::Created {
                self.adopt_home_dir(&event.path);
            }
            return;
        }

        let is_rule_file = event
            .path
            .file_name()
            .is_some_and(|name| name == self.config.paths.rule_file_name.as_str());
        if !is_rule_file {
            return;
        }
        let Some(workspace) =
            workspace_of_rule_file(&self.config.paths.workspace_home, &event.path)
        else {
            debug!(path = %event.path.display(), "rule file outside any workspace");
            return;
        };

        if event.change == Change::Deleted {
            self.engine.clear_rules(&workspace);
            return;
        }

        match load_rule_file(self.fs.as_ref(), &event.path, &workspace) {
            Ok(rules) => {
                let active = self.engine.reload_rules(&workspace, rules);
                debug!(%workspace, active, "rule file applied");
            }
            Err(err) => {
                warn!(
                    %workspace,
                    path = %event.path.display(),
                    error = %err,
                    "could not load rule file; keeping previous rules"
                );
            }
        }
    }

    /// A new directory appeared in the home tree: watch it when it is a new
    /// top-level workspace, and load any rule files it already holds.
    fn adopt_home_dir(&mut self, dir: &Path) {
        let hidden = dir
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.'));
        if hidden {
            return;
        }
        if self.is_root() && !self.rule_watch.is_watched(dir) {
            match self.rule_watch.add_watch(dir, true) {
                Ok(()) => info!(path = %dir.display(), "watching new workspace home"),
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "failed to watch new workspace home");
                    return;
                }
            }
        }
        for file in find_rule_files(self.fs.as_ref(), dir, &self.config.paths.rule_file_name) {
            self.handle_rule_event(Event::modified(file, false));
        }
    }

    /// Run until `shutdown` flips to true (or its sender goes away).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.bootstrap()?;
        self.preload_rules();
        self.load_dir_cache();
        self.try_activate();
        info!(rules = self.engine.rules().rule_count(), activated = self.activated, "monitor started");

        let poll_secs = self.config.engine.activation_poll_secs.max(1);
        let mut poll = tokio::time::interval(Duration::from_secs(poll_secs));
        poll.tick().await;

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }

                    Some(event) = self.rule_rx.recv() => {
                        self.handle_rule_event(event);
                        self.try_activate();
                    }

                    Some(event) = self.data_rx.recv() => {
                        self.engine.ingest(event).await;
                    }

                    _ = poll.tick(), if !self.activated => {
                        self.try_activate();
                    }

                    else => break,
                }
            }
        }

        self.stop().await;
        Ok(())
    }

    /// Drain the worker pool within the grace period and persist the
    /// directory cache.
    pub async fn stop(&self) {
        let grace = Duration::from_secs(self.config.engine.shutdown_grace_secs);
        self.engine.shutdown(grace).await;

        if self.activated && !self.is_root() {
            if let Err(err) = self.engine.dir_cache().save(self.fs.as_ref()) {
                warn!(error = %err, "failed to save directory cache");
            }
        }
        info!("monitor stopped");
    }
}
