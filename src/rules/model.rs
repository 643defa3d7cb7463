// src/rules/model.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::errors::{Result, TriggerError};
use crate::exec::command::CommandOp;
use crate::rules::limits::{RateLimit, parse_rate_limit, parse_settle_time};
use crate::types::{Change, RuleId, WorkspaceName};

/// One `[[rule]]` table as written by the rule editor.
///
/// ```toml
/// [[rule]]
/// rule_id = "convert-csv"
/// path = "incoming/*.csv"
/// changes = ["created", "modified"]
/// run_as = "alice@example.org"
/// action = "submit"
/// templates = ["::EXECUTE::\nconvert +TRIGGERPATH+\n"]
/// rate_limit = "10/h"
/// settle_time = "30s"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    pub rule_id: String,
    pub path: String,

    #[serde(default)]
    pub match_dirs: bool,

    #[serde(default = "default_true")]
    pub match_files: bool,

    #[serde(default)]
    pub match_recursive: bool,

    pub changes: Vec<String>,
    pub run_as: String,
    pub action: String,

    #[serde(default)]
    pub arguments: Vec<String>,

    #[serde(default)]
    pub templates: Vec<String>,

    #[serde(default)]
    pub rate_limit: String,

    #[serde(default)]
    pub settle_time: String,
}

fn default_true() -> bool {
    true
}

/// What a rule does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Synthesize events with the given change for the expanded arguments.
    Cascade(Change),
    /// Submit the expanded templates as batch jobs.
    Submit,
    /// Run a built-in backend command, named by `arguments[0]`.
    Command(CommandOp),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Cascade(change) => write!(f, "cascade-{change}"),
            Action::Submit => f.write_str("submit"),
            Action::Command(_) => f.write_str("command"),
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Action {
    /// Parse the `action` field. Command rules need their first argument to
    /// resolve the operation.
    pub fn parse(action: &str, arguments: &[String]) -> std::result::Result<Self, String> {
        let action = action.trim();
        let cascade = action
            .strip_prefix("cascade-")
            .or_else(|| action.strip_prefix("trigger-"));
        if let Some(change) = cascade {
            return Change::from_str(change).map(Action::Cascade);
        }
        match action {
            "submit" => Ok(Action::Submit),
            "command" => {
                let Some(op) = arguments.first() else {
                    return Err("command rules need the operation as first argument".to_string());
                };
                CommandOp::from_str(op).map(Action::Command)
            }
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// A validated, immutable trigger rule.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerRule {
    pub rule_id: RuleId,
    pub workspace: WorkspaceName,
    /// Glob relative to the workspace data directory, without leading `/`.
    pub path: String,
    pub match_dirs: bool,
    pub match_files: bool,
    pub match_recursive: bool,
    pub changes: Vec<Change>,
    pub run_as: String,
    pub action: Action,
    pub arguments: Vec<String>,
    pub templates: Vec<String>,
    pub rate_limit: String,
    pub settle_time: String,

    #[serde(skip)]
    pub rate: RateLimit,
    #[serde(skip)]
    pub settle_secs: f64,
}

impl TriggerRule {
    pub fn reacts_to(&self, change: Change) -> bool {
        self.changes.contains(&change)
    }

    /// Arguments passed on to the command backend (the operation name
    /// stripped for command rules).
    pub fn action_arguments(&self) -> &[String] {
        match self.action {
            Action::Command(_) => self.arguments.get(1..).unwrap_or_default(),
            _ => &self.arguments,
        }
    }

    /// How long hit history must be retained for this rule.
    pub fn history_window(&self) -> f64 {
        self.rate.period_secs.max(self.settle_secs)
    }
}

impl RawRule {
    /// Validate and attach the rule to `workspace`.
    pub fn into_rule(self, workspace: &str) -> Result<TriggerRule> {
        let invalid = |reason: String| TriggerError::InvalidRule {
            rule_id: self.rule_id.clone(),
            reason,
        };

        if self.rule_id.trim().is_empty() {
            return Err(invalid("rule_id must not be empty".to_string()));
        }

        let path = self.path.trim().trim_start_matches('/').to_string();
        if path.is_empty() {
            return Err(invalid("path must not be empty".to_string()));
        }

        if self.run_as.trim().is_empty() {
            return Err(invalid("run_as must not be empty".to_string()));
        }

        if self.changes.is_empty() {
            return Err(invalid("changes must list at least one change".to_string()));
        }
        let mut changes = Vec::with_capacity(self.changes.len());
        for raw in &self.changes {
            let change = Change::from_str(raw).map_err(&invalid)?;
            if !changes.contains(&change) {
                changes.push(change);
            }
        }

        let action = Action::parse(&self.action, &self.arguments).map_err(&invalid)?;
        if action == Action::Submit && self.templates.is_empty() {
            return Err(invalid("submit rules need at least one template".to_string()));
        }

        Ok(TriggerRule {
            rate: parse_rate_limit(&self.rate_limit),
            settle_secs: parse_settle_time(&self.settle_time),
            rule_id: self.rule_id,
            workspace: workspace.to_string(),
            path,
            match_dirs: self.match_dirs,
            match_files: self.match_files,
            match_recursive: self.match_recursive,
            changes,
            run_as: self.run_as,
            action,
            arguments: self.arguments,
            templates: self.templates,
            rate_limit: self.rate_limit,
            settle_time: self.settle_time,
        })
    }
}
