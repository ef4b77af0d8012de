//! Transport registry and session factory.
//!
//! Maps transport names to concrete [`Transport`] implementations and wires
//! a configured transport into sessions.

use std::sync::Arc;

use crate::bot::config::BotConfig;
use crate::bot::request::RequestBuilder;
use crate::bot::session::{ChatSession, CompletionSession};
use crate::bot::settings::DefaultsProvider;
use crate::bot::transport::Transport;
use crate::bot::transports::HttpTransport;
use crate::error::BotError;

/// Creates a [`Transport`] based on the configured transport name.
///
/// # Supported Transports
///
/// - `"http"` (default) — `OpenAI`-compatible APIs via `reqwest`
///
/// # Errors
///
/// Returns [`BotError::UnsupportedTransport`] for unknown names.
pub fn create_transport(config: &BotConfig) -> Result<Arc<dyn Transport>, BotError> {
    match config.transport.as_str() {
        "http" => Ok(Arc::new(HttpTransport::new(config)?)),
        other => Err(BotError::UnsupportedTransport {
            name: other.to_string(),
        }),
    }
}

/// Explicitly constructed client handing out sessions that share one
/// transport.
#[derive(Clone)]
pub struct BotClient {
    transport: Arc<dyn Transport>,
    builder: RequestBuilder,
    config: BotConfig,
}

impl std::fmt::Debug for BotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotClient")
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BotClient {
    /// Creates a client using the transport named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BotError`] if the transport cannot be created.
    pub fn new(config: BotConfig, defaults: Arc<dyn DefaultsProvider>) -> Result<Self, BotError> {
        let transport = create_transport(&config)?;
        Ok(Self::with_transport(config, defaults, transport))
    }

    /// Creates a client around an existing transport.
    pub fn with_transport(
        config: BotConfig,
        defaults: Arc<dyn DefaultsProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let builder = RequestBuilder::new(defaults).with_role_names(config.role_names());
        Self {
            transport,
            builder,
            config,
        }
    }

    /// Starts a stateless completion session.
    pub fn completion_session(&self) -> CompletionSession {
        CompletionSession::new(Arc::clone(&self.transport), self.builder.clone())
            .with_resolve_timeout(self.config.resolve_timeout)
    }

    /// Starts a chat session with an empty conversation.
    pub fn chat_session(&self) -> ChatSession {
        ChatSession::new(Arc::clone(&self.transport), self.builder.clone())
            .with_resolve_timeout(self.config.resolve_timeout)
    }

    /// Configuration this client was built from.
    #[must_use]
    pub const fn config(&self) -> &BotConfig {
        &self.config
    }
}
