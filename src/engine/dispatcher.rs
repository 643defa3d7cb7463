// src/engine/dispatcher.rs

//! Per-monitor trigger engine: turns ingested [`Event`]s into rule jobs.
//!
//! An event goes through directory-cache side effects, the miss cache, rule
//! matching, per-rule filtering and the settle/rate check synchronously in
//! `ingest`. Accepted pairs become jobs on the [`WorkerPool`], which wait
//! out the settle time and then run the action (see `actions.rs`).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::access::AccessPolicy;
use crate::config::ConfigFile;
use crate::engine::audit::{AUDIT_LOG_NAME, WorkflowLog};
use crate::engine::history::{HitHistory, Verdict};
use crate::engine::miss_cache::MissCache;
use crate::engine::pool::WorkerPool;
use crate::exec::{BoxFuture, CommandBackend, JobBackend};
use crate::fs::FileSystem;
use crate::rules::{RuleCandidate, RuleStore, TriggerRule};
use crate::types::{Change, ROOT_WORKSPACE, RuleId, Timestamp, now_secs};
use crate::watch::dir_cache::DirCache;
use crate::watch::event::Event;
use crate::watch::service::WatchService;

/// File name of the persisted directory cache inside a workspace home.
pub const DIR_CACHE_FILE_NAME: &str = ".dir_cache.toml";

/// Everything the engine talks to outside of its own state.
#[derive(Debug, Clone)]
pub struct EngineBackends {
    pub fs: Arc<dyn FileSystem>,
    pub watch: Arc<dyn WatchService>,
    pub access: Arc<dyn AccessPolicy>,
    pub commands: Arc<dyn CommandBackend>,
    pub jobs: Arc<dyn JobBackend>,
}

/// What `ingest` decided for one event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Rules that passed every filter.
    pub matched: usize,
    /// Rules whose job was queued.
    pub queued: usize,
    /// Rules stopped by settle time or rate limit.
    pub limited: usize,
    /// The event was dropped by the miss cache.
    pub cached_miss: bool,
    /// The event was an access-only `modified`.
    pub access_only: bool,
}

#[derive(Debug)]
pub struct TriggerEngine {
    pub(super) config: Arc<ConfigFile>,
    workspace: String,
    rules: RuleStore,
    pub(super) history: HitHistory,
    misses: MissCache,
    dirs: Mutex<DirCache>,
    pub(super) pool: WorkerPool,
    pub(super) backends: EngineBackends,
    audit_logs: Mutex<HashMap<String, WorkflowLog>>,
}

impl TriggerEngine {
    /// Build the engine for the monitor of `workspace`. Must be called
    /// inside a tokio runtime (the worker pool spawns its runner).
    pub fn new(config: Arc<ConfigFile>, workspace: &str, backends: EngineBackends) -> Arc<Self> {
        let engine_cfg = &config.engine;
        let cache_file = (workspace != ROOT_WORKSPACE)
            .then(|| config.workspace_home_of(workspace).join(DIR_CACHE_FILE_NAME));
        let dirs = DirCache::new(
            workspace,
            &config.paths.data_root,
            config.data_dir_of(workspace),
            cache_file,
        );

        Arc::new(Self {
            rules: RuleStore::new(&config.paths.data_root),
            history: HitHistory::new(),
            misses: MissCache::new(engine_cfg.miss_cache_ttl_secs, engine_cfg.miss_cache_expire_size),
            dirs: Mutex::new(dirs),
            pool: WorkerPool::new(
                engine_cfg.max_workers,
                engine_cfg.queue_length,
                Duration::from_millis(engine_cfg.submit_backoff_ms),
            ),
            workspace: workspace.to_string(),
            backends,
            audit_logs: Mutex::new(HashMap::new()),
            config,
        })
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn history(&self) -> &HitHistory {
        &self.history
    }

    pub fn miss_cache(&self) -> &MissCache {
        &self.misses
    }

    pub fn backends(&self) -> &EngineBackends {
        &self.backends
    }

    pub fn dir_cache(&self) -> MutexGuard<'_, DirCache> {
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the rules of `workspace`. Rules that survive the reload keep
    /// their hit history; the history of dropped rules is forgotten.
    pub fn reload_rules(&self, workspace: &str, rules: Vec<TriggerRule>) -> usize {
        let kept: HashSet<RuleId> = rules.iter().map(|rule| rule.rule_id.clone()).collect();
        self.misses.clear();
        self.history.retain_rules(workspace, &kept);
        self.rules.reload(workspace, rules)
    }

    pub fn clear_rules(&self, workspace: &str) {
        self.history.forget_workspace(workspace);
        self.rules.clear(workspace);
    }

    /// Audit log of `workspace`, shared so rotation is serialized.
    pub fn audit_log(&self, workspace: &str) -> WorkflowLog {
        let mut logs = self.audit_logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.entry(workspace.to_string())
            .or_insert_with(|| {
                WorkflowLog::new(
                    Arc::clone(&self.backends.fs),
                    self.config.workspace_home_of(workspace).join(AUDIT_LOG_NAME),
                    &self.config.audit,
                )
            })
            .clone()
    }

    /// Resolve once every queued job has finished.
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    pub async fn shutdown(&self, grace: Duration) {
        self.pool.shutdown(grace).await;
    }

    /// Run one event through the dispatcher. Boxed because directory
    /// creation and cascades ingest further events recursively.
    pub fn ingest(self: &Arc<Self>, event: Event) -> BoxFuture<'static, DispatchOutcome> {
        let engine = Arc::clone(self);
        Box::pin(async move { engine.dispatch(event).await })
    }

    async fn dispatch(self: Arc<Self>, mut event: Event) -> DispatchOutcome {
        let now = now_secs();
        let timestamp = *event.timestamp.get_or_insert(now);
        let mut outcome = DispatchOutcome::default();

        // A path moved out of the tree is gone before it can be inspected;
        // what we watched or cached there was a directory.
        if event.change == Change::Deleted && !event.is_directory {
            event.is_directory = self.dir_cache().get(&event.path).is_some()
                || self.backends.watch.is_watched(&event.path);
        }

        let children = if event.is_directory {
            self.apply_dir_side_effects(&event)
        } else {
            Vec::new()
        };

        let fingerprint = event.fingerprint();
        if self.misses.is_recent_miss(&fingerprint, now) {
            debug!(path = %event.path.display(), change = %event.change, "skipping recent miss");
            outcome.cached_miss = true;
        } else {
            self.evaluate(&event, timestamp, &mut outcome).await;
            self.misses
                .update(&fingerprint, outcome.matched > 0, timestamp, now);
        }

        for child in children {
            self.ingest(child).await;
        }
        outcome
    }

    /// Keep the directory cache and the watches in line with directory
    /// events. Returns the synthesized children of a created directory.
    fn apply_dir_side_effects(&self, event: &Event) -> Vec<Event> {
        let fs = self.backends.fs.as_ref();
        let watch = self.backends.watch.as_ref();
        let mut dirs = self.dir_cache();
        match event.change {
            Change::Created => {
                let children = dirs.ensure_watch(fs, watch, &event.path);
                if !children.is_empty() {
                    debug!(
                        path = %event.path.display(),
                        children = children.len(),
                        "synthesizing created events for new directory"
                    );
                }
                children
            }
            Change::Deleted => {
                for dir in dirs.remove_tree(&event.path) {
                    watch.remove_watch(&dir);
                }
                Vec::new()
            }
            Change::Modified => {
                dirs.refresh(fs, &event.path);
                Vec::new()
            }
        }
    }

    async fn evaluate(self: &Arc<Self>, event: &Event, timestamp: Timestamp, outcome: &mut DispatchOutcome) {
        let candidates = self.rules.rules_for_path(&event.path);
        if candidates.is_empty() {
            return;
        }

        let accepted: Vec<Arc<TriggerRule>> = candidates
            .into_iter()
            .filter(|candidate| self.passes_filters(event, candidate))
            .map(|candidate| candidate.rule)
            .collect();
        outcome.matched = accepted.len();
        if accepted.is_empty() {
            return;
        }

        if event.change == Change::Modified
            && !event.synthetic
            && !self.recently_modified(&event.path, timestamp)
        {
            debug!(path = %event.path.display(), "skipping access-only modified event");
            outcome.access_only = true;
            return;
        }

        for rule in accepted {
            let verdict = self.history.check_and_record(
                &rule,
                &event.path,
                event.change,
                "",
                timestamp,
            );
            match verdict {
                Verdict::Limited(field) => {
                    let detail = self.history.describe(&rule, &event.path, field);
                    info!(
                        workspace = %rule.workspace,
                        rule_id = %rule.rule_id,
                        path = %event.path.display(),
                        limit = field.label(),
                        %detail,
                        "skipping trigger"
                    );
                    outcome.limited += 1;
                }
                Verdict::Fire => {
                    debug!(
                        workspace = %rule.workspace,
                        rule_id = %rule.rule_id,
                        path = %event.path.display(),
                        change = %event.change,
                        "queueing trigger job"
                    );
                    let job = Arc::clone(self).run_job(event.clone(), rule, timestamp);
                    match self.pool.submit(job).await {
                        Ok(()) => outcome.queued += 1,
                        Err(err) => {
                            warn!(path = %event.path.display(), error = %err, "dropping trigger job");
                        }
                    }
                }
            }
        }
    }

    fn passes_filters(&self, event: &Event, candidate: &RuleCandidate) -> bool {
        let rule = &candidate.rule;
        if event.is_directory && !rule.match_dirs {
            return false;
        }
        if !event.is_directory && !rule.match_files {
            return false;
        }
        if !candidate.hit.accepted_by(rule.match_recursive) {
            return false;
        }
        if !rule.reacts_to(event.change) {
            return false;
        }
        if !self.backends.access.has_access(&rule.run_as, &rule.workspace) {
            warn!(
                workspace = %rule.workspace,
                rule_id = %rule.rule_id,
                run_as = %rule.run_as,
                "rule owner no longer has access; ignoring rule"
            );
            return false;
        }
        true
    }

    /// Whether a `modified` event reflects a content change rather than a
    /// plain read. Unreadable metadata counts as modified.
    fn recently_modified(&self, path: &Path, timestamp: Timestamp) -> bool {
        match self.backends.fs.metadata(path) {
            Ok(times) => {
                times.mtime == times.atime
                    || times.mtime > timestamp - self.config.engine.atime_slack_secs
            }
            Err(_) => true,
        }
    }

    /// Job body: wait for the path to settle, take an action slot, run the
    /// action. Failures end here, logged and audited.
    async fn run_job(self: Arc<Self>, event: Event, rule: Arc<TriggerRule>, timestamp: Timestamp) {
        let mut timestamp = timestamp;
        let mut wait = rule.settle_secs;
        while wait > 0.0 {
            info!(
                rule_id = %rule.rule_id,
                path = %event.path.display(),
                wait_secs = wait,
                "waiting for events to settle"
            );
            let Ok(pause) = Duration::try_from_secs_f64(wait) else {
                warn!(rule_id = %rule.rule_id, wait_secs = wait, "unusable settle wait; not waiting");
                break;
            };
            tokio::time::sleep(pause).await;
            timestamp += wait;
            wait = self
                .history
                .remaining_wait(&rule, &event.path, rule.settle_secs, timestamp);
        }

        let slots = self.pool.slots();
        let Ok(_permit) = slots.acquire_owned().await else {
            debug!(rule_id = %rule.rule_id, "pool closed before action could run");
            return;
        };

        if let Err(err) = self.run_action(&event, &rule).await {
            let rel = self.relative_path(&rule, &event.path);
            warn!(
                workspace = %rule.workspace,
                rule_id = %rule.rule_id,
                path = %rel,
                error = %err,
                "trigger action failed"
            );
            self.audit_log(&rule.workspace)
                .error(&format!("failed to run {} action for {rel}: {err}", rule.action));
        }
    }
}
