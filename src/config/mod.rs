// src/config/mod.rs

//! Daemon configuration for vgrid-events.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate paths and engine limits (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{AuditSection, ConfigFile, EngineSection, PathsSection, RawConfigFile};
