use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::MediatorConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "missive.toml",
    "missive.yaml",
    "missive.yml",
    "missive.json",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported config format: .{extension}")]
    UnsupportedFormat { extension: String },

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<MediatorConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let config = parse_config(&raw, path)?;

    let diagnostics = crate::validate::check_config(&config);
    if let Some(first) = diagnostics
        .iter()
        .find(|d| d.severity == crate::Severity::Error)
    {
        return Err(ConfigError::Invalid {
            message: format!("{}: {}", first.path, first.message),
        }
        .into());
    }
    for d in &diagnostics {
        warn!(path = %d.path, "{}", d.message);
    }
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./missive.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/missive/missive.{toml,yaml,yml,json}` (user-global)
///
/// Returns `MediatorConfig::default()` if no config file is found.
pub fn discover_and_load() -> MediatorConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    MediatorConfig::default()
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/missive/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "missive").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<MediatorConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(ConfigError::UnsupportedFormat {
            extension: ext.to_string(),
        }
        .into()),
    }
}
