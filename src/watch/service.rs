// src/watch/service.rs

use std::collections::HashSet;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::watch::event::Event;

/// Subscription interface to the OS change notification primitive.
pub trait WatchService: Send + Sync + Debug {
    fn add_watch(&self, path: &Path, recursive: bool) -> Result<()>;
    fn remove_watch(&self, path: &Path);
    fn is_watched(&self, path: &Path) -> bool;
}

/// `notify`-backed watch service.
///
/// The notify callback runs on notify's own thread; it translates raw events
/// and forwards them over an unbounded channel, so delivery order is kept and
/// the callback never blocks.
pub struct NotifyWatchService {
    watcher: Mutex<RecommendedWatcher>,
    watched: Mutex<HashSet<PathBuf>>,
    label: &'static str,
}

impl Debug for NotifyWatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatchService")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl NotifyWatchService {
    pub fn new(label: &'static str, tx: mpsc::UnboundedSender<Event>) -> Result<Self> {
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for ev in events_from_notify(event) {
                        if tx.send(ev).is_err() {
                            // Receiver gone: the monitor is shutting down.
                            return;
                        }
                    }
                }
                Err(err) => warn!(watcher = label, error = %err, "file watch error"),
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            watched: Mutex::new(HashSet::new()),
            label,
        })
    }
}

impl WatchService for NotifyWatchService {
    fn add_watch(&self, path: &Path, recursive: bool) -> Result<()> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .watch(path, mode)?;
        self.watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf());
        debug!(watcher = self.label, path = %path.display(), recursive, "watch added");
        Ok(())
    }

    fn remove_watch(&self, path: &Path) {
        let was_watched = self
            .watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        if !was_watched {
            return;
        }
        // The kernel drops watches of deleted directories on its own, so an
        // error here usually just means it is already gone.
        if let Err(err) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwatch(path)
        {
            debug!(watcher = self.label, path = %path.display(), error = %err, "unwatch failed");
        }
    }

    fn is_watched(&self, path: &Path) -> bool {
        self.watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }
}

/// Translate a raw notify event into engine events.
///
/// Renames become a deletion of the source plus a creation of the
/// destination. Pure access notifications are dropped; metadata changes
/// surface as `modified` and are sorted out by the engine's mtime check.
pub fn events_from_notify(event: notify::Event) -> Vec<Event> {
    let notify::Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(kind) => paths
            .into_iter()
            .map(|p| {
                let is_dir = matches!(kind, CreateKind::Folder) || p.is_dir();
                Event::created(p, is_dir)
            })
            .collect(),
        EventKind::Remove(kind) => paths
            .into_iter()
            .map(|p| Event::deleted(p, matches!(kind, RemoveKind::Folder)))
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => rename_events(mode, paths),
        EventKind::Modify(_) => paths
            .into_iter()
            .map(|p| {
                let is_dir = p.is_dir();
                Event::modified(p, is_dir)
            })
            .collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn rename_events(mode: RenameMode, paths: Vec<PathBuf>) -> Vec<Event> {
    match mode {
        RenameMode::Both => {
            let mut iter = paths.into_iter();
            match (iter.next(), iter.next()) {
                (Some(from), Some(to)) => {
                    let is_dir = to.is_dir();
                    vec![Event::deleted(from, is_dir), Event::created(to, is_dir)]
                }
                (Some(only), None) => vec![existence_event(only)],
                _ => Vec::new(),
            }
        }
        RenameMode::From => paths
            .into_iter()
            .map(|p| Event::deleted(p, false))
            .collect(),
        RenameMode::To => paths
            .into_iter()
            .map(|p| {
                let is_dir = p.is_dir();
                Event::created(p, is_dir)
            })
            .collect(),
        RenameMode::Any | RenameMode::Other => paths.into_iter().map(existence_event).collect(),
    }
}

fn existence_event(path: PathBuf) -> Event {
    if path.exists() {
        let is_dir = path.is_dir();
        Event::created(path, is_dir)
    } else {
        Event::deleted(path, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Change;
    use notify::event::{AccessKind, DataChange};

    fn raw(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut ev = notify::Event::new(kind);
        for p in paths {
            ev = ev.add_path(PathBuf::from(p));
        }
        ev
    }

    #[test]
    fn rename_both_becomes_delete_and_create() {
        let evs = events_from_notify(raw(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/nonexistent/a", "/nonexistent/b"],
        ));
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0].change, Change::Deleted);
        assert_eq!(evs[0].path, PathBuf::from("/nonexistent/a"));
        assert_eq!(evs[1].change, Change::Created);
        assert_eq!(evs[1].path, PathBuf::from("/nonexistent/b"));
    }

    #[test]
    fn data_change_is_modified_and_access_is_dropped() {
        let modified = events_from_notify(raw(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/nonexistent/x"],
        ));
        assert_eq!(modified[0].change, Change::Modified);

        let access = events_from_notify(raw(
            EventKind::Access(AccessKind::Read),
            &["/nonexistent/x"],
        ));
        assert!(access.is_empty());
    }

    #[test]
    fn folder_removal_keeps_directory_flag() {
        let evs = events_from_notify(raw(
            EventKind::Remove(RemoveKind::Folder),
            &["/nonexistent/dir"],
        ));
        assert!(evs[0].is_directory);
        assert_eq!(evs[0].change, Change::Deleted);
    }
}
