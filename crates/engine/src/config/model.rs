//! Data model for the client configuration file.

use std::path::PathBuf;
use std::time::Duration;

use graphrun_api::ClientOptions;
use graphrun_util::DecoderOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ControllerOptions;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no base URL configured; set baseUrl in the config file, GRAPHRUN_BASE_URL, or pass --base-url")]
    MissingBaseUrl,
}

/// Client configuration as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GraphrunConfig {
    /// Base URL of the execution service (for example, "http://localhost:8080").
    pub base_url: Option<String>,
    /// Connect timeout, also bounding the whole `init` request.
    pub request_timeout_secs: Option<u64>,
    /// Bound on one whole submit or resume cycle. Unset means no limit.
    pub stream_timeout_secs: Option<u64>,
    /// Cap on unparsed bytes buffered by the stream decoder. Unset means no cap.
    pub max_buffer_bytes: Option<usize>,
}

impl Default for GraphrunConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: Some(30),
            stream_timeout_secs: None,
            max_buffer_bytes: None,
        }
    }
}

impl GraphrunConfig {
    pub fn base_url(&self) -> Result<&str, ConfigError> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingBaseUrl)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            stream_timeout: self.stream_timeout_secs.map(Duration::from_secs),
            decoder: DecoderOptions {
                max_buffer_bytes: self.max_buffer_bytes,
            },
        }
    }
}
