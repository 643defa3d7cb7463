// src/rules/store.rs

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::rules::model::TriggerRule;
use crate::watch::path_utils::slash_str;
use crate::watch::patterns::{PathMatcher, PatternHit};

/// All rules sharing one absolute target pattern.
#[derive(Debug)]
pub struct RuleTarget {
    pub matcher: PathMatcher,
    pub rules: Vec<Arc<TriggerRule>>,
}

/// The complete, immutable rule set of one workspace.
#[derive(Debug, Default)]
pub struct WorkspaceRules {
    targets: Vec<RuleTarget>,
}

impl WorkspaceRules {
    pub fn targets(&self) -> &[RuleTarget] {
        &self.targets
    }

    pub fn rules(&self) -> impl Iterator<Item = &Arc<TriggerRule>> {
        self.targets.iter().flat_map(|t| t.rules.iter())
    }
}

/// A rule whose target matched a path, with how it matched.
#[derive(Debug, Clone)]
pub struct RuleCandidate {
    pub rule: Arc<TriggerRule>,
    pub hit: PatternHit,
}

/// Per-workspace rule sets, swapped wholesale on reload.
///
/// Readers take a snapshot of the `Arc`s and match without holding the lock,
/// so a concurrent reload is seen either entirely or not at all.
#[derive(Debug)]
pub struct RuleStore {
    data_root: PathBuf,
    workspaces: RwLock<HashMap<String, Arc<WorkspaceRules>>>,
}

impl RuleStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            workspaces: RwLock::new(HashMap::new()),
        }
    }

    /// Absolute target pattern of a rule.
    pub fn target_pattern(&self, rule: &TriggerRule) -> String {
        let base = slash_str(&self.data_root.join(&rule.workspace));
        format!("{}/{}", base.trim_end_matches('/'), rule.path)
    }

    /// Replace all rules of `workspace`. Rules of every other workspace,
    /// including ones whose name extends this one, are untouched.
    ///
    /// Returns the number of rules now active for the workspace.
    pub fn reload(&self, workspace: &str, rules: Vec<TriggerRule>) -> usize {
        let mut grouped: BTreeMap<String, Vec<Arc<TriggerRule>>> = BTreeMap::new();
        for rule in rules {
            let pattern = self.target_pattern(&rule);
            grouped.entry(pattern).or_default().push(Arc::new(rule));
        }

        let mut targets = Vec::with_capacity(grouped.len());
        let mut count = 0;
        for (pattern, rules) in grouped {
            match PathMatcher::new(&pattern) {
                Ok(matcher) => {
                    count += rules.len();
                    targets.push(RuleTarget { matcher, rules });
                }
                Err(err) => {
                    for rule in &rules {
                        warn!(
                            workspace,
                            rule_id = %rule.rule_id,
                            error = %err,
                            "dropping rule with uncompilable pattern"
                        );
                    }
                }
            }
        }

        let mut guard = self
            .workspaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if targets.is_empty() {
            guard.remove(workspace);
        } else {
            guard.insert(workspace.to_string(), Arc::new(WorkspaceRules { targets }));
        }
        info!(workspace, rules = count, "rules reloaded");
        count
    }

    /// Drop every rule of `workspace` (rule file deleted).
    pub fn clear(&self, workspace: &str) {
        let removed = self
            .workspaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(workspace);
        if removed.is_some() {
            info!(workspace, "rules cleared");
        }
    }

    fn snapshot(&self) -> Vec<Arc<WorkspaceRules>> {
        self.workspaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Current rule set of one workspace, if it has any rules.
    pub fn workspace_rules(&self, workspace: &str) -> Option<Arc<WorkspaceRules>> {
        self.workspaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workspace)
            .cloned()
    }

    /// Every rule whose target matches `path` directly or recursively.
    ///
    /// Whether a recursive-only hit counts is left to the caller, which
    /// knows the rule's `match_recursive` flag.
    pub fn rules_for_path(&self, path: &Path) -> Vec<RuleCandidate> {
        let path = slash_str(path);
        let mut found = Vec::new();
        for ws in self.snapshot() {
            for target in ws.targets() {
                let hit = target.matcher.matches(&path);
                if hit.any() {
                    found.extend(target.rules.iter().map(|rule| RuleCandidate {
                        rule: Arc::clone(rule),
                        hit,
                    }));
                }
            }
        }
        found
    }

    /// Target patterns located below `base_dir`.
    ///
    /// The prefix test uses `base_dir` plus a separator so `/data/Project`
    /// does not claim targets of `/data/Project-Management`.
    pub fn active_targets(&self, base_dir: &Path) -> Vec<String> {
        let mut prefix = slash_str(base_dir);
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        let mut targets: Vec<String> = self
            .snapshot()
            .iter()
            .flat_map(|ws| ws.targets().iter())
            .map(|t| t.matcher.pattern().to_string())
            .filter(|pattern| pattern.starts_with(&prefix))
            .collect();
        targets.sort();
        targets
    }

    pub fn rule_count(&self) -> usize {
        self.snapshot().iter().map(|ws| ws.rules().count()).sum()
    }

    /// Names of workspaces with at least one active rule, sorted.
    pub fn workspaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .workspaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
