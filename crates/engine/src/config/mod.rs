//! Configuration for the graphrun client.
//! This module handles parsing and environment overrides of the
//! ~/.config/graphrun/config.json configuration file.

mod io;
mod model;

pub use io::{BASE_URL_ENV, CONFIG_PATH_ENV, apply_env_overrides, default_config_path, load_config, load_config_from_path};
pub use model::{ConfigError, GraphrunConfig};
