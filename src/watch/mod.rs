// src/watch/mod.rs

//! File watching and directory bookkeeping.
//!
//! This module is responsible for:
//! - Compiling rule target globs into direct/recursive matchers.
//! - Wiring up a cross-platform filesystem watcher (`notify`) behind the
//!   `WatchService` trait.
//! - Tracking which workspace directories are known and watched.
//!
//! It does **not** know about rules firing; it only turns filesystem
//! changes into `Event`s.

pub mod dir_cache;
pub mod event;
pub mod path_utils;
pub mod patterns;
pub mod service;

pub use dir_cache::{ActivationReport, DirCache};
pub use event::Event;
pub use patterns::{PathMatcher, PatternHit, expand_glob, matches};
pub use service::{NotifyWatchService, WatchService, events_from_notify};
