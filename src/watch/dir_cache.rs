// src/watch/dir_cache.rs

//! Persistent map of known workspace directories to their last seen mtime.
//!
//! The cache lets a restarted monitor re-install its directory watches
//! without firing `created` for the whole tree again: only directories whose
//! mtime moved since the last run are rescanned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::types::Timestamp;
use crate::watch::event::Event;
use crate::watch::path_utils::relative_str;
use crate::watch::service::WatchService;

#[derive(Debug, Serialize, Deserialize)]
struct DirCacheFile {
    workspace: String,
    #[serde(default)]
    dirs: BTreeMap<String, Timestamp>,
}

/// What [`DirCache::activate`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActivationReport {
    pub watched: usize,
    pub refreshed: usize,
    pub pruned: usize,
}

#[derive(Debug)]
pub struct DirCache {
    workspace: String,
    data_root: PathBuf,
    base_dir: PathBuf,
    /// `None` keeps the cache in memory only (root monitor).
    cache_file: Option<PathBuf>,
    /// Keyed by path relative to `data_root`.
    entries: BTreeMap<String, Timestamp>,
}

impl DirCache {
    pub fn new(
        workspace: impl Into<String>,
        data_root: impl Into<PathBuf>,
        base_dir: impl Into<PathBuf>,
        cache_file: Option<PathBuf>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            data_root: data_root.into(),
            base_dir: base_dir.into(),
            cache_file,
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Timestamp> {
        self.entries.clone()
    }

    fn key(&self, dir: &Path) -> Option<String> {
        relative_str(&self.data_root, dir)
    }

    pub fn get(&self, dir: &Path) -> Option<Timestamp> {
        self.key(dir).and_then(|k| self.entries.get(&k).copied())
    }

    pub fn insert(&mut self, dir: &Path, mtime: Timestamp) {
        if let Some(key) = self.key(dir) {
            self.entries.insert(key, mtime);
        }
    }

    /// Forget `dir` and everything below it. Returns the absolute paths of
    /// the removed entries.
    pub fn remove_tree(&mut self, dir: &Path) -> Vec<PathBuf> {
        let Some(key) = self.key(dir) else {
            return Vec::new();
        };
        let nested = format!("{key}/");
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|k| **k == key || k.starts_with(&nested) || key.is_empty())
            .cloned()
            .collect();
        doomed
            .into_iter()
            .map(|k| {
                self.entries.remove(&k);
                self.data_root.join(k)
            })
            .collect()
    }

    /// Update the mtime of an already known directory.
    pub fn refresh(&mut self, fs: &dyn FileSystem, dir: &Path) {
        let Some(key) = self.key(dir) else {
            return;
        };
        if !self.entries.contains_key(&key) {
            return;
        }
        match fs.metadata(dir) {
            Ok(meta) => {
                self.entries.insert(key, meta.mtime);
            }
            Err(_) => {
                self.entries.remove(&key);
            }
        }
    }

    /// Walk the workspace tree and rebuild the cache from scratch.
    pub fn generate(&mut self, fs: &dyn FileSystem) {
        self.entries.clear();
        let mut stack = vec![self.base_dir.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(meta) = fs.metadata(&dir) else {
                continue;
            };
            if !meta.is_dir {
                continue;
            }
            self.insert(&dir, meta.mtime);
            if let Ok(children) = fs.read_dir(&dir) {
                stack.extend(children.into_iter().filter(|c| fs.is_dir(c)));
            }
        }
        info!(workspace = %self.workspace, dirs = self.entries.len(), "directory cache generated");
    }

    /// Persist the cache. No-op for in-memory caches.
    pub fn save(&self, fs: &dyn FileSystem) -> Result<()> {
        let Some(cache_file) = &self.cache_file else {
            return Ok(());
        };
        let file = DirCacheFile {
            workspace: self.workspace.clone(),
            dirs: self.entries.clone(),
        };
        let text = toml::to_string(&file)?;
        fs.write(cache_file, text.as_bytes())?;
        debug!(workspace = %self.workspace, path = %cache_file.display(), "directory cache saved");
        Ok(())
    }

    /// Restore the cache from disk, generating and saving a fresh one when
    /// the file is missing or unreadable.
    pub fn load(&mut self, fs: &dyn FileSystem) -> Result<()> {
        let Some(cache_file) = self.cache_file.clone() else {
            return Ok(());
        };

        let parsed = fs
            .read_to_string(&cache_file)
            .map_err(|e| e.to_string())
            .and_then(|text| toml::from_str::<DirCacheFile>(&text).map_err(|e| e.to_string()));

        match parsed {
            Ok(file) => {
                self.entries = file.dirs;
                info!(workspace = %self.workspace, dirs = self.entries.len(), "directory cache loaded");
                Ok(())
            }
            Err(reason) => {
                debug!(workspace = %self.workspace, %reason, "no usable directory cache; generating");
                self.generate(fs);
                self.save(fs)
            }
        }
    }

    /// Make sure `dir` is cached and watched, and return `created` events
    /// for its children: every file, plus subdirectories that are unknown or
    /// cached with an mtime older than `dir`'s.
    pub fn ensure_watch(
        &mut self,
        fs: &dyn FileSystem,
        watch: &dyn WatchService,
        dir: &Path,
    ) -> Vec<Event> {
        let Ok(meta) = fs.metadata(dir) else {
            // Gone again before we got to it.
            return Vec::new();
        };
        self.insert(dir, meta.mtime);

        if !watch.is_watched(dir) {
            if let Err(err) = watch.add_watch(dir, false) {
                warn!(workspace = %self.workspace, path = %dir.display(), error = %err, "failed to watch directory");
            }
        }

        let Ok(children) = fs.read_dir(dir) else {
            return Vec::new();
        };
        let mut events = Vec::new();
        for child in children {
            if fs.is_dir(&child) {
                let stale = self.get(&child).is_none_or(|cached| cached < meta.mtime);
                if stale {
                    events.push(Event::created(child, true));
                }
            } else {
                events.push(Event::created(child, false));
            }
        }
        events.sort_by(|a, b| a.path.cmp(&b.path));
        events
    }

    /// Install watches for every cached directory, refresh entries whose
    /// mtime changed (picking up subdirectories created while nobody was
    /// watching) and prune directories that disappeared.
    pub fn activate(&mut self, fs: &dyn FileSystem, watch: &dyn WatchService) -> ActivationReport {
        let mut report = ActivationReport::default();
        if self.get(&self.base_dir).is_none() {
            if let Ok(meta) = fs.metadata(&self.base_dir) {
                let base = self.base_dir.clone();
                self.insert(&base, meta.mtime);
            }
        }

        let mut pending: Vec<String> = self.entries.keys().cloned().collect();
        while let Some(key) = pending.pop() {
            let dir = self.data_root.join(&key);
            let meta = match fs.metadata(&dir) {
                Ok(meta) if meta.is_dir => meta,
                _ => {
                    self.entries.remove(&key);
                    report.pruned += 1;
                    continue;
                }
            };

            if !watch.is_watched(&dir) {
                match watch.add_watch(&dir, false) {
                    Ok(()) => report.watched += 1,
                    Err(err) => {
                        warn!(workspace = %self.workspace, path = %dir.display(), error = %err, "failed to watch directory");
                    }
                }
            }

            let cached = self.entries.get(&key).copied();
            if cached == Some(meta.mtime) {
                continue;
            }
            self.entries.insert(key, meta.mtime);
            report.refreshed += 1;

            if let Ok(children) = fs.read_dir(&dir) {
                for child in children {
                    if !fs.is_dir(&child) {
                        continue;
                    }
                    if let Some(child_key) = self.key(&child) {
                        if !self.entries.contains_key(&child_key) {
                            // Unknown mtime forces a refresh when popped.
                            self.entries.insert(child_key.clone(), Timestamp::NEG_INFINITY);
                            pending.push(child_key);
                        }
                    }
                }
            }
        }

        info!(
            workspace = %self.workspace,
            watched = report.watched,
            refreshed = report.refreshed,
            pruned = report.pruned,
            "directory watches activated"
        );
        report
    }
}
