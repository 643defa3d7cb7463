// src/rules/mod.rs

//! Trigger rules: the per-workspace rule file model, its loader and the
//! store the dispatcher queries.

pub mod limits;
pub mod loader;
pub mod model;
pub mod store;

pub use limits::{RateLimit, parse_rate_limit, parse_settle_time};
pub use loader::{load_rule_file, parse_rules};
pub use model::{Action, RawRule, TriggerRule};
pub use store::{RuleCandidate, RuleStore, RuleTarget, WorkspaceRules};
