// src/engine/history.rs

//! Sliding-window hit history backing rate limits and settle times.
//!
//! Every evaluated (rule, path) observation is recorded, whether or not the
//! action runs. A rule's records are pruned to its longest window
//! (`max(rate period, settle time)`) relative to the newest record.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::rules::TriggerRule;
use crate::types::{Change, RuleId, Timestamp, WorkspaceName};

#[derive(Debug, Clone, PartialEq)]
pub struct HitRecord {
    pub path: PathBuf,
    pub change: Change,
    pub reference: String,
    pub timestamp: Timestamp,
}

/// Which limit of a rule to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitField {
    RateLimit,
    SettleTime,
}

impl LimitField {
    pub fn label(&self) -> &'static str {
        match self {
            LimitField::RateLimit => "rate limit",
            LimitField::SettleTime => "settle time",
        }
    }

    /// `(hit_count, period_secs)` for this field of `rule`. Settle time acts
    /// like a limit of one hit per settle window.
    fn limits(&self, rule: &TriggerRule) -> (i64, f64) {
        match self {
            LimitField::RateLimit => (rule.rate.max_hits, rule.rate.period_secs),
            LimitField::SettleTime => (1, rule.settle_secs),
        }
    }
}

/// Outcome of [`HitHistory::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fire,
    /// Held back by the named limit; the hit was still recorded.
    Limited(LimitField),
}

type RuleKey = (WorkspaceName, RuleId);

#[derive(Debug, Default)]
pub struct HitHistory {
    hits: Mutex<HashMap<RuleKey, Vec<HitRecord>>>,
}

fn key_of(rule: &TriggerRule) -> RuleKey {
    (rule.workspace.clone(), rule.rule_id.clone())
}

fn over_limit(
    records: &[HitRecord],
    rule: &TriggerRule,
    path: &Path,
    field: LimitField,
    timestamp: Timestamp,
) -> bool {
    let (hit_count, period) = field.limits(rule);
    if hit_count <= 0 || period <= 0.0 {
        return false;
    }
    let recent = records
        .iter()
        .filter(|r| r.path == path && timestamp - r.timestamp <= period)
        .count();
    recent as i64 >= hit_count
}

fn push_and_prune(records: &mut Vec<HitRecord>, record: HitRecord, window: f64) {
    let newest = record.timestamp;
    records.push(record);
    records.retain(|r| newest - r.timestamp <= window);
}

impl HitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RuleKey, Vec<HitRecord>>> {
        self.hits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(
        &self,
        rule: &TriggerRule,
        path: &Path,
        change: Change,
        reference: &str,
        timestamp: Timestamp,
    ) {
        let record = HitRecord {
            path: path.to_path_buf(),
            change,
            reference: reference.to_string(),
            timestamp,
        };
        let mut hits = self.lock();
        push_and_prune(
            hits.entry(key_of(rule)).or_default(),
            record,
            rule.history_window(),
        );
    }

    pub fn is_over_limit(
        &self,
        rule: &TriggerRule,
        path: &Path,
        field: LimitField,
        timestamp: Timestamp,
    ) -> bool {
        let hits = self.lock();
        let records = hits.get(&key_of(rule)).map(Vec::as_slice).unwrap_or_default();
        over_limit(records, rule, path, field, timestamp)
    }

    /// Seconds still needed without further events on `path` before it
    /// counts as settled. Zero when nothing recent is on record.
    pub fn remaining_wait(
        &self,
        rule: &TriggerRule,
        path: &Path,
        settle_secs: f64,
        timestamp: Timestamp,
    ) -> f64 {
        let hits = self.lock();
        let Some(records) = hits.get(&key_of(rule)) else {
            return 0.0;
        };
        let min_elapsed = records
            .iter()
            .filter(|r| r.path == path)
            .map(|r| timestamp - r.timestamp)
            .filter(|elapsed| *elapsed <= settle_secs)
            .fold(f64::INFINITY, f64::min);
        if min_elapsed.is_infinite() {
            0.0
        } else {
            (settle_secs - min_elapsed).max(0.0)
        }
    }

    /// Check settle time, then rate limit, and record the hit regardless of
    /// the outcome, all under one lock so concurrent events on the same
    /// path cannot both slip through.
    pub fn check_and_record(
        &self,
        rule: &TriggerRule,
        path: &Path,
        change: Change,
        reference: &str,
        timestamp: Timestamp,
    ) -> Verdict {
        let mut hits = self.lock();
        let records = hits.entry(key_of(rule)).or_default();

        let verdict = [LimitField::SettleTime, LimitField::RateLimit]
            .into_iter()
            .find(|field| over_limit(records, rule, path, *field, timestamp))
            .map_or(Verdict::Fire, Verdict::Limited);

        push_and_prune(
            records,
            HitRecord {
                path: path.to_path_buf(),
                change,
                reference: reference.to_string(),
                timestamp,
            },
            rule.history_window(),
        );
        verdict
    }

    /// Human readable summary for log and audit lines.
    pub fn describe(&self, rule: &TriggerRule, path: &Path, field: LimitField) -> String {
        let (hit_count, period) = field.limits(rule);
        let hits = self.lock();
        let entries = hits
            .get(&key_of(rule))
            .map(|records| records.iter().filter(|r| r.path == path).count())
            .unwrap_or(0);
        format!(
            "found {entries} entries in trigger history and {} is {hit_count} per {period} s",
            field.label()
        )
    }

    /// Records currently held for a rule (oldest first).
    pub fn records(&self, rule: &TriggerRule) -> Vec<HitRecord> {
        self.lock().get(&key_of(rule)).cloned().unwrap_or_default()
    }

    /// Forget the history of every rule of `workspace` (rule file deleted).
    pub fn forget_workspace(&self, workspace: &str) {
        self.lock().retain(|(ws, _), _| ws != workspace);
    }

    /// Forget the history of rules of `workspace` not named in `keep`.
    pub fn retain_rules(&self, workspace: &str, keep: &HashSet<RuleId>) {
        self.lock()
            .retain(|(ws, rule_id), _| ws != workspace || keep.contains(rule_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RawRule;

    fn rule(rate_limit: &str, settle_time: &str) -> TriggerRule {
        RawRule {
            rule_id: "r".to_string(),
            path: "*.csv".to_string(),
            match_dirs: false,
            match_files: true,
            match_recursive: false,
            changes: vec!["created".to_string()],
            run_as: "alice".to_string(),
            action: "command".to_string(),
            arguments: vec!["touch".to_string(), "x".to_string()],
            templates: Vec::new(),
            rate_limit: rate_limit.to_string(),
            settle_time: settle_time.to_string(),
        }
        .into_rule("Project")
        .unwrap()
    }

    #[test]
    fn rate_limit_blocks_third_hit_but_records_it() {
        let r = rule("2/m", "");
        let h = HitHistory::new();
        let p = Path::new("/d/data.csv");

        assert_eq!(h.check_and_record(&r, p, Change::Created, "", 0.0), Verdict::Fire);
        assert_eq!(h.check_and_record(&r, p, Change::Created, "", 4.0), Verdict::Fire);
        assert_eq!(
            h.check_and_record(&r, p, Change::Created, "", 9.0),
            Verdict::Limited(LimitField::RateLimit)
        );
        assert_eq!(h.records(&r).len(), 3);
    }

    #[test]
    fn rate_limit_is_per_path() {
        let r = rule("1/m", "");
        let h = HitHistory::new();
        h.record(&r, Path::new("/d/a.csv"), Change::Created, "", 0.0);
        assert!(h.is_over_limit(&r, Path::new("/d/a.csv"), LimitField::RateLimit, 1.0));
        assert!(!h.is_over_limit(&r, Path::new("/d/b.csv"), LimitField::RateLimit, 1.0));
    }

    #[test]
    fn settle_time_is_checked_before_rate_limit() {
        let r = rule("1/m", "10s");
        let h = HitHistory::new();
        let p = Path::new("/d/a.csv");
        h.record(&r, p, Change::Created, "", 0.0);
        assert_eq!(
            h.check_and_record(&r, p, Change::Created, "", 1.0),
            Verdict::Limited(LimitField::SettleTime)
        );
    }

    #[test]
    fn retain_rules_drops_only_unlisted_rules_of_the_workspace() {
        let kept = rule("", "");
        let mut dropped = rule("", "");
        dropped.rule_id = "gone".to_string();
        let mut elsewhere = rule("", "");
        elsewhere.rule_id = "gone".to_string();
        elsewhere.workspace = "Project-Management".to_string();

        let h = HitHistory::new();
        let p = Path::new("/d/a.csv");
        for r in [&kept, &dropped, &elsewhere] {
            h.record(r, p, Change::Created, "", 0.0);
        }

        h.retain_rules("Project", &HashSet::from(["r".to_string()]));

        assert_eq!(h.records(&kept).len(), 1);
        assert!(h.records(&dropped).is_empty());
        assert_eq!(h.records(&elsewhere).len(), 1);
    }

    #[test]
    fn remaining_wait_counts_from_latest_hit() {
        let r = rule("", "5s");
        let h = HitHistory::new();
        let p = Path::new("/d/out.bin");
        h.record(&r, p, Change::Modified, "", 100.0);
        h.record(&r, p, Change::Modified, "", 103.0);
        assert_eq!(h.remaining_wait(&r, p, 5.0, 105.0), 3.0);
        assert_eq!(h.remaining_wait(&r, p, 5.0, 108.0), 0.0);
        assert_eq!(h.remaining_wait(&r, Path::new("/d/other"), 5.0, 105.0), 0.0);
    }

    #[test]
    fn old_records_are_pruned_to_longest_window() {
        let r = rule("5/s", "3s");
        let h = HitHistory::new();
        let p = Path::new("/d/a.csv");
        h.record(&r, p, Change::Created, "", 0.0);
        h.record(&r, p, Change::Created, "", 2.0);
        h.record(&r, p, Change::Created, "", 10.0);
        assert_eq!(h.records(&r).len(), 1);
    }

    #[test]
    fn disabled_limits_never_block() {
        let r = rule("", "");
        let h = HitHistory::new();
        let p = Path::new("/d/a.csv");
        for t in 0..20 {
            assert_eq!(
                h.check_and_record(&r, p, Change::Created, "", f64::from(t)),
                Verdict::Fire
            );
        }
        assert!(h.describe(&r, p, LimitField::RateLimit).contains("rate limit is -1"));
    }
}
