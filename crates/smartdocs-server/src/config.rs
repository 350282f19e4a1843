//! Server configuration
//!
//! Settings come from an optional `smartdocs.json` and are then overridden
//! by command-line flags. Every field has a default, so an empty file (or
//! no file at all) gives a working local server.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smartdocs_core::quota::FREE_PROMPT_LIMIT;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Current config file format version.
///
/// Increment this when making breaking changes to the config format.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Config format version (for migrations)
    pub version: u32,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Completion model name
    pub model: String,

    /// Base URL of the completion API
    pub api_base_url: String,

    /// API key; normally supplied through the environment
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Upper bound on one completion request, in seconds
    pub request_timeout_secs: u64,

    /// Prompts available to non-premium users
    pub prompt_limit: u32,

    /// User ids exempt from the prompt limit
    pub premium_users: HashSet<String>,

    /// Where documents and usage are persisted; in-memory only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            host: "127.0.0.1".to_string(),
            port: 3000,
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            request_timeout_secs: 60,
            prompt_limit: FREE_PROMPT_LIMIT,
            premium_users: HashSet::new(),
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: ServerConfig =
            serde_json::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;

        // Check version compatibility
        if config.version > CURRENT_CONFIG_VERSION {
            return Err(Error::ConfigVersionTooNew {
                found: config.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }
        if config.version < CURRENT_CONFIG_VERSION {
            warn!(
                old_version = config.version,
                new_version = CURRENT_CONFIG_VERSION,
                "Config file uses an older format version"
            );
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_premium(&self, user_id: &str) -> bool {
        self.premium_users.contains(user_id)
    }
}
