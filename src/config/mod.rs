// src/config/mod.rs

//! Configuration loading and validation for fetchq.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and build service and request options (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate, resolve_config_path, CONFIG_ENV};
pub use model::{ConfigFile, PlannedRequest, RawConfigFile, RequestEntry, ServiceSection};
pub use validate::validate_config;
