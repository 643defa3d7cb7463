// src/engine/mod.rs

//! Trigger engine for one workspace monitor.
//!
//! This module ties together:
//! - the rule store and the per-rule hit history (settle time, rate limit)
//! - the miss cache that short-circuits events no rule cares about
//! - the worker pool that runs accepted jobs
//! - the cascade, submit and command actions, with their audit trail
//!
//! [`TriggerEngine::ingest`] is the single entry point for events, whether
//! they come from the watch service or from a cascade.

pub mod actions;
pub mod audit;
pub mod dispatcher;
pub mod expand;
pub mod history;
pub mod miss_cache;
pub mod pool;

pub use audit::{AUDIT_LOG_NAME, AuditLevel, WorkflowLog};
pub use dispatcher::{DIR_CACHE_FILE_NAME, DispatchOutcome, EngineBackends, TriggerEngine};
pub use expand::PlaceholderMap;
pub use history::{HitHistory, HitRecord, LimitField, Verdict};
pub use miss_cache::MissCache;
pub use pool::WorkerPool;
