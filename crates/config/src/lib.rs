//! Configuration loading, validation, and env substitution.
//!
//! Config files: `missive.toml`, `missive.yaml`, or `missive.json`
//! Searched in `./` then `~/.config/missive/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{ConfigError, config_dir, discover_and_load, load_config},
    schema::{MediatorConfig, RetryConfig, SideConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
