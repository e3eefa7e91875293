//! Configuration IO helpers.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use graphrun_util::expand_tilde;
use tracing::debug;

use super::{ConfigError, GraphrunConfig};

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "GRAPHRUN_CONFIG_PATH";

/// Environment variable overriding the configured base URL.
pub const BASE_URL_ENV: &str = "GRAPHRUN_BASE_URL";

/// Returns the default path for the configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("graphrun").join("config.json")
}

/// Loads configuration from the default path and applies environment overrides.
pub fn load_config() -> Result<GraphrunConfig, ConfigError> {
    let path = default_config_path();
    let mut config = load_config_from_path(&path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Loads configuration from a specific path. A missing file yields defaults.
pub fn load_config_from_path(path: &Path) -> Result<GraphrunConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(GraphrunConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Applies `GRAPHRUN_BASE_URL` on top of file configuration.
pub fn apply_env_overrides(config: &mut GraphrunConfig) {
    if let Ok(base_url) = env::var(BASE_URL_ENV)
        && !base_url.trim().is_empty()
    {
        config.base_url = Some(base_url.trim().to_string());
    }
}
