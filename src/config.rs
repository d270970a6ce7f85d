//! Chat layer configuration

use crate::session::{DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL_MS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding [`ChatConfig::base_url`]
pub const ENV_BASE_URL: &str = "CAMPUS_CHAT_BASE_URL";

/// Environment variable overriding [`ChatConfig::auth_token`]
pub const ENV_AUTH_TOKEN: &str = "CAMPUS_CHAT_TOKEN";

/// Chat configuration
///
/// Stored as JSON. Missing fields take their defaults.
///
/// # Example
/// ```rust,no_run
/// use campus_chat::ChatConfig;
///
/// // Load config (returns default if file doesn't exist)
/// let mut config = ChatConfig::load("chat.json").expect("Failed to load");
/// config.apply_env();
/// config.validate().expect("Invalid config");
///
/// println!("Polling {} every {}ms", config.base_url, config.poll_interval_ms);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Messaging API base URL
    pub base_url: String,
    /// Bearer token sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Consecutive server errors before a session stops itself
    pub max_retries: u32,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            auth_token: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout_ms: 10_000,
        }
    }
}

impl ChatConfig {
    /// Load configuration from a JSON file
    ///
    /// Returns the defaults if the file doesn't exist or is empty.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a JSON file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        Ok(())
    }

    /// Apply `CAMPUS_CHAT_BASE_URL` and `CAMPUS_CHAT_TOKEN` if set
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(token) = std::env::var(ENV_AUTH_TOKEN) {
            if !token.trim().is_empty() {
                self.auth_token = Some(token);
            }
        }
    }

    /// Reject values the polling service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Validation("base_url must not be empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Validation("poll_interval_ms must be positive".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::Validation("max_retries must be positive".to_string()));
        }
        Ok(())
    }
}
