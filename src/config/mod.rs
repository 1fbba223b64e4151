// src/config/mod.rs

//! Configuration loading and validation for dagrun.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate commands, retry settings and DAG correctness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ConfigSection, DefaultSection, RawConfigFile, TaskConfig, parse_duration,
};
pub use validate::validate_raw_config;
