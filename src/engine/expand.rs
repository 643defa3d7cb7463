// src/engine/expand.rs

//! `+TRIGGER...+` placeholder expansion for action arguments and job
//! templates.

use crate::rules::TriggerRule;
use crate::types::Change;

pub const TRIGGER_PATH: &str = "+TRIGGERPATH+";
pub const TRIGGER_DIRNAME: &str = "+TRIGGERDIRNAME+";
pub const TRIGGER_FILENAME: &str = "+TRIGGERFILENAME+";
pub const TRIGGER_PREFIX: &str = "+TRIGGERPREFIX+";
pub const TRIGGER_EXTENSION: &str = "+TRIGGEREXTENSION+";
pub const TRIGGER_CHANGE: &str = "+TRIGGERCHANGE+";
pub const TRIGGER_VGRIDNAME: &str = "+TRIGGERVGRIDNAME+";
pub const TRIGGER_RUNAS: &str = "+TRIGGERRUNAS+";

/// Placeholder values for one (event, rule) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMap {
    entries: Vec<(&'static str, String)>,
}

impl PlaceholderMap {
    /// `rel_path` is the changed path relative to the rule's workspace data
    /// directory, `/`-separated.
    pub fn new(rel_path: &str, rule: &TriggerRule, change: Change) -> Self {
        let rel_path = rel_path.trim_start_matches('/');
        let (dirname, filename) = match rel_path.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", rel_path),
        };
        let (prefix, extension) = split_extension(filename);

        Self {
            entries: vec![
                (TRIGGER_PATH, rel_path.to_string()),
                (TRIGGER_DIRNAME, dirname.to_string()),
                (TRIGGER_FILENAME, filename.to_string()),
                (TRIGGER_PREFIX, prefix.to_string()),
                (TRIGGER_EXTENSION, extension.to_string()),
                (TRIGGER_CHANGE, change.to_string()),
                (TRIGGER_VGRIDNAME, rule.workspace.clone()),
                (TRIGGER_RUNAS, rule.run_as.clone()),
            ],
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn fill(&self, template: &str) -> String {
        self.entries
            .iter()
            .fold(template.to_string(), |acc, (key, value)| acc.replace(key, value))
    }
}

/// Split a file name into stem and extension (with its dot). Leading dots
/// do not start an extension, so `.bashrc` has none.
fn split_extension(filename: &str) -> (&str, &str) {
    let body_start = filename.len() - filename.trim_start_matches('.').len();
    match filename[body_start..].rfind('.') {
        Some(idx) => filename.split_at(body_start + idx),
        None => (filename, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RawRule;

    fn rule() -> TriggerRule {
        RawRule {
            rule_id: "r".to_string(),
            path: "*".to_string(),
            match_dirs: false,
            match_files: true,
            match_recursive: true,
            changes: vec!["modified".to_string()],
            run_as: "alice@example.org".to_string(),
            action: "cascade-modified".to_string(),
            arguments: Vec::new(),
            templates: Vec::new(),
            rate_limit: String::new(),
            settle_time: String::new(),
        }
        .into_rule("Project")
        .unwrap()
    }

    #[test]
    fn all_placeholders_expand() {
        let map = PlaceholderMap::new("raw/run1/img.tar.gz", &rule(), Change::Modified);
        let filled = map.fill(
            "+TRIGGERDIRNAME+|+TRIGGERFILENAME+|+TRIGGERPREFIX+|+TRIGGEREXTENSION+|\
             +TRIGGERCHANGE+|+TRIGGERVGRIDNAME+|+TRIGGERRUNAS+|+TRIGGERPATH+",
        );
        assert_eq!(
            filled,
            "raw/run1|img.tar.gz|img.tar|.gz|modified|Project|alice@example.org|raw/run1/img.tar.gz"
        );
    }

    #[test]
    fn top_level_file_has_empty_dirname() {
        let map = PlaceholderMap::new("a.txt", &rule(), Change::Created);
        assert_eq!(map.get(TRIGGER_DIRNAME), Some(""));
        assert_eq!(map.get(TRIGGER_PREFIX), Some("a"));
    }

    #[test]
    fn hidden_file_has_no_extension() {
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension("..x.y"), ("..x", ".y"));
        assert_eq!(split_extension("noext"), ("noext", ""));
    }
}
