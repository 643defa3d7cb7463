// src/rules/loader.rs

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::rules::model::{RawRule, TriggerRule};

/// On-disk layout of a workspace rule file: a list of `[[rule]]` tables.
///
/// Entries are kept as raw TOML values so one malformed table does not fail
/// the whole file.
#[derive(Debug, Default, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rule: Vec<toml::Value>,
}

/// Parse rule file contents for `workspace`.
///
/// A TOML syntax error fails the whole file; individual invalid rules and
/// duplicated `rule_id`s are logged and dropped.
pub fn parse_rules(contents: &str, workspace: &str) -> Result<Vec<TriggerRule>> {
    let file: RuleFile = toml::from_str(contents)?;

    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(file.rule.len());

    for (index, value) in file.rule.into_iter().enumerate() {
        let raw = match value.try_into::<RawRule>() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(workspace, index, error = %err, "dropping malformed rule entry");
                continue;
            }
        };

        let rule = match raw.into_rule(workspace) {
            Ok(rule) => rule,
            Err(err) => {
                warn!(workspace, index, error = %err, "dropping invalid rule");
                continue;
            }
        };

        if !seen.insert(rule.rule_id.clone()) {
            warn!(
                workspace,
                rule_id = %rule.rule_id,
                "dropping rule with duplicated rule_id"
            );
            continue;
        }

        rules.push(rule);
    }

    debug!(workspace, count = rules.len(), "parsed rule file");
    Ok(rules)
}

/// Read and parse a rule file through the filesystem abstraction.
pub fn load_rule_file(
    fs: &dyn FileSystem,
    path: &Path,
    workspace: &str,
) -> Result<Vec<TriggerRule>> {
    let contents = fs.read_to_string(path)?;
    parse_rules(&contents, workspace)
}
