// src/engine/miss_cache.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::types::Timestamp;

/// Short-lived negative cache: "this exact event matched no rule recently".
///
/// Entries are only swept once the cache reaches `expire_size`, so lookups
/// stay O(1) under event storms.
#[derive(Debug)]
pub struct MissCache {
    ttl_secs: f64,
    expire_size: usize,
    entries: Mutex<HashMap<String, Timestamp>>,
}

impl MissCache {
    pub fn new(ttl_secs: f64, expire_size: usize) -> Self {
        Self {
            ttl_secs,
            expire_size,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Timestamp>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_recent_miss(&self, fingerprint: &str, now: Timestamp) -> bool {
        self.lock()
            .get(fingerprint)
            .is_some_and(|missed| missed + self.ttl_secs > now)
    }

    /// Record the outcome of evaluating an event: a hit clears any cached
    /// miss, a miss is remembered at `timestamp`.
    pub fn update(&self, fingerprint: &str, hit: bool, timestamp: Timestamp, now: Timestamp) {
        let mut entries = self.lock();
        if hit {
            entries.remove(fingerprint);
            return;
        }
        entries.insert(fingerprint.to_string(), timestamp);
        if entries.len() < self.expire_size {
            return;
        }
        let before = entries.len();
        let ttl = self.ttl_secs;
        entries.retain(|_, missed| *missed + ttl >= now);
        debug!(before, after = entries.len(), "expired old miss cache entries");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
