#![allow(dead_code)]

use std::path::PathBuf;

use vgrid_events::config::{AuditSection, ConfigFile, EngineSection, PathsSection, RawConfigFile};
use vgrid_events::rules::{RawRule, TriggerRule};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Defaults to `/home` as workspace home and `/data` as data root, which is
/// what the `MockFileSystem` based tests lay out.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                paths: PathsSection {
                    workspace_home: PathBuf::from("/home"),
                    data_root: PathBuf::from("/data"),
                    rule_file_name: "triggers.toml".to_string(),
                    spool_dir: None,
                },
                engine: EngineSection::default(),
                audit: AuditSection::default(),
            },
        }
    }

    pub fn workspace_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.workspace_home = path.into();
        self
    }

    pub fn data_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.data_root = path.into();
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.engine.max_workers = n;
        self
    }

    pub fn queue_length(mut self, n: usize) -> Self {
        self.config.engine.queue_length = n;
        self
    }

    pub fn miss_cache_ttl_secs(mut self, secs: f64) -> Self {
        self.config.engine.miss_cache_ttl_secs = secs;
        self
    }

    pub fn atime_slack_secs(mut self, secs: f64) -> Self {
        self.config.engine.atime_slack_secs = secs;
        self
    }

    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.config.engine.shutdown_grace_secs = secs;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TriggerRule`.
pub struct RuleBuilder {
    rule: RawRule,
}

impl RuleBuilder {
    /// A file rule reacting to `created`, running as `alice`.
    pub fn new(rule_id: &str, path: &str, action: &str) -> Self {
        Self {
            rule: RawRule {
                rule_id: rule_id.to_string(),
                path: path.to_string(),
                match_dirs: false,
                match_files: true,
                match_recursive: false,
                changes: vec!["created".to_string()],
                run_as: "alice".to_string(),
                action: action.to_string(),
                arguments: vec![],
                templates: vec![],
                rate_limit: String::new(),
                settle_time: String::new(),
            },
        }
    }

    pub fn changes(mut self, changes: &[&str]) -> Self {
        self.rule.changes = changes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn argument(mut self, arg: &str) -> Self {
        self.rule.arguments.push(arg.to_string());
        self
    }

    pub fn template(mut self, template: &str) -> Self {
        self.rule.templates.push(template.to_string());
        self
    }

    pub fn run_as(mut self, user: &str) -> Self {
        self.rule.run_as = user.to_string();
        self
    }

    pub fn rate_limit(mut self, limit: &str) -> Self {
        self.rule.rate_limit = limit.to_string();
        self
    }

    pub fn settle_time(mut self, settle: &str) -> Self {
        self.rule.settle_time = settle.to_string();
        self
    }

    pub fn match_dirs(mut self, val: bool) -> Self {
        self.rule.match_dirs = val;
        self
    }

    pub fn match_files(mut self, val: bool) -> Self {
        self.rule.match_files = val;
        self
    }

    pub fn match_recursive(mut self, val: bool) -> Self {
        self.rule.match_recursive = val;
        self
    }

    pub fn raw(self) -> RawRule {
        self.rule
    }

    pub fn build(self, workspace: &str) -> TriggerRule {
        self.rule
            .into_rule(workspace)
            .expect("Failed to build valid rule from builder")
    }
}
