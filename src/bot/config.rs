//! Client configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use super::request::RoleNames;
use super::resolver::DEFAULT_RESOLVE_TIMEOUT;
use crate::error::BotError;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Default transport name.
pub const DEFAULT_TRANSPORT: &str = "http";
/// Default connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
/// Directory under the home directory holding hexbot state.
const STATE_DIR: &str = ".hexbot";
/// Preset file name inside [`STATE_DIR`].
const PRESETS_FILE: &str = "presets.json";

/// Configuration for the streaming client.
#[derive(Clone)]
pub struct BotConfig {
    /// Transport name (e.g., "http").
    pub transport: String,
    /// API key for the backend.
    pub api_key: String,
    /// API base URL, without trailing endpoint path.
    pub base_url: String,
    /// Display name attached to user messages.
    pub user_name: Option<String>,
    /// Display name attached to assistant messages.
    pub assistant_name: Option<String>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// How long to wait for a streamed error body after a rejection.
    pub resolve_timeout: Duration,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("transport", &self.transport)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("user_name", &self.user_name)
            .field("assistant_name", &self.assistant_name)
            .field("connect_timeout", &self.connect_timeout)
            .field("resolve_timeout", &self.resolve_timeout)
            .finish()
    }
}

impl BotConfig {
    /// Creates a new builder for `BotConfig`.
    #[must_use]
    pub fn builder() -> BotConfigBuilder {
        BotConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, BotError> {
        Self::builder().from_env().build()
    }

    /// Display names for chat requests.
    #[must_use]
    pub fn role_names(&self) -> RoleNames {
        RoleNames {
            user: self.user_name.clone(),
            assistant: self.assistant_name.clone(),
        }
    }
}

/// Builder for [`BotConfig`].
#[derive(Debug, Clone, Default)]
pub struct BotConfigBuilder {
    transport: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    user_name: Option<String>,
    assistant_name: Option<String>,
    connect_timeout: Option<Duration>,
    resolve_timeout: Option<Duration>,
}

impl BotConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.transport.is_none() {
            self.transport = std::env::var("HEXBOT_TRANSPORT").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("HEXBOT_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("HEXBOT_BASE_URL")
                .or_else(|_| std::env::var("OPENAI_BASE_URL"))
                .ok();
        }
        if self.user_name.is_none() {
            self.user_name = std::env::var("HEXBOT_USER_NAME").ok();
        }
        if self.assistant_name.is_none() {
            self.assistant_name = std::env::var("HEXBOT_ASSISTANT_NAME").ok();
        }
        self
    }

    /// Sets the transport name.
    #[must_use]
    pub fn transport(mut self, name: impl Into<String>) -> Self {
        self.transport = Some(name.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the user display name.
    #[must_use]
    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Sets the assistant display name.
    #[must_use]
    pub fn assistant_name(mut self, name: impl Into<String>) -> Self {
        self.assistant_name = Some(name.into());
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Sets the error-body wait.
    #[must_use]
    pub const fn resolve_timeout(mut self, duration: Duration) -> Self {
        self.resolve_timeout = Some(duration);
        self
    }

    /// Builds the [`BotConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`BotError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<BotConfig, BotError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(BotError::ApiKeyMissing)?;

        Ok(BotConfig {
            transport: self
                .transport
                .unwrap_or_else(|| DEFAULT_TRANSPORT.to_string()),
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            user_name: self.user_name,
            assistant_name: self.assistant_name,
            connect_timeout: self
                .connect_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
            resolve_timeout: self.resolve_timeout.unwrap_or(DEFAULT_RESOLVE_TIMEOUT),
        })
    }
}

/// Default preset file location.
///
/// Honors `HEXBOT_PRESETS_PATH`, then `~/.hexbot/presets.json`.
#[must_use]
pub fn default_presets_path() -> Option<PathBuf> {
    std::env::var_os("HEXBOT_PRESETS_PATH")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(STATE_DIR).join(PRESETS_FILE)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = BotConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.transport, DEFAULT_TRANSPORT);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.resolve_timeout, DEFAULT_RESOLVE_TIMEOUT);
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
        assert_eq!(config.role_names(), RoleNames::default());
    }

    #[test]
    fn test_builder_missing_api_key() {
        assert!(matches!(
            BotConfig::builder().build(),
            Err(BotError::ApiKeyMissing)
        ));
        assert!(BotConfig::builder().api_key("  ").build().is_err());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = BotConfig::builder()
            .api_key("key")
            .base_url("http://localhost:8080/v1")
            .user_name("Artur")
            .assistant_name("Hex")
            .resolve_timeout(Duration::from_millis(50))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.role_names().user.as_deref(), Some("Artur"));
        assert_eq!(config.role_names().assistant.as_deref(), Some("Hex"));
        assert_eq!(config.resolve_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = BotConfig::builder()
            .api_key("sk-secret")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(!format!("{config:?}").contains("sk-secret"));
    }
}
