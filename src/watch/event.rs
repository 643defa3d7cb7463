// src/watch/event.rs

use std::path::{Path, PathBuf};

use crate::types::{Change, Timestamp};

/// A filesystem change as seen by the trigger engine, either delivered by
/// the watch service or synthesized by a cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub path: PathBuf,
    pub change: Change,
    pub is_directory: bool,
    /// Assigned on ingestion unless the producer already set one.
    pub timestamp: Option<Timestamp>,
    /// `(path, change)` pairs this event descends from, oldest first,
    /// including the event itself for cascaded events.
    pub chain: Vec<(PathBuf, Change)>,
    pub synthetic: bool,
}

impl Event {
    pub fn new(path: impl Into<PathBuf>, change: Change, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            change,
            is_directory,
            timestamp: None,
            chain: Vec::new(),
            synthetic: false,
        }
    }

    pub fn created(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self::new(path, Change::Created, is_directory)
    }

    pub fn modified(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self::new(path, Change::Modified, is_directory)
    }

    pub fn deleted(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self::new(path, Change::Deleted, is_directory)
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Event produced by a cascade from a parent whose chain is
    /// `parent_chain`.
    pub fn cascaded(
        path: impl Into<PathBuf>,
        change: Change,
        is_directory: bool,
        parent_chain: Vec<(PathBuf, Change)>,
    ) -> Self {
        let path = path.into();
        let mut chain = parent_chain;
        chain.push((path.clone(), change));
        Self {
            path,
            change,
            is_directory,
            timestamp: None,
            chain,
            synthetic: true,
        }
    }

    /// Key for the miss cache.
    pub fn fingerprint(&self) -> String {
        format!(
            "path={};state={};isdir={}",
            self.path.display(),
            self.change,
            self.is_directory
        )
    }

    /// The chain a cascade from this event extends. Watch-service events
    /// start a fresh chain rooted at themselves.
    pub fn chain_or_origin(&self) -> Vec<(PathBuf, Change)> {
        if self.chain.is_empty() {
            vec![(self.path.clone(), self.change)]
        } else {
            self.chain.clone()
        }
    }

    /// Whether `(path, change)` already occurred in this event's ancestry.
    pub fn chain_contains(&self, path: &Path, change: Change) -> bool {
        self.chain_or_origin()
            .iter()
            .any(|(p, c)| p == path && *c == change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_matches_miss_cache_key_format() {
        let ev = Event::modified("/d/a.txt", false);
        assert_eq!(ev.fingerprint(), "path=/d/a.txt;state=modified;isdir=false");
    }

    #[test]
    fn cascade_extends_origin_chain() {
        let origin = Event::created("/d/in.csv", false);
        let child = Event::cascaded(
            "/d/out.csv",
            Change::Modified,
            false,
            origin.chain_or_origin(),
        );
        assert!(child.synthetic);
        assert_eq!(child.chain.len(), 2);
        assert!(child.chain_contains(Path::new("/d/in.csv"), Change::Created));
        assert!(!child.chain_contains(Path::new("/d/in.csv"), Change::Modified));
    }
}
