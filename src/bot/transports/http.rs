//! HTTP transport for `OpenAI`-compatible APIs using `reqwest`.
//!
//! Posts the request JSON to `{base_url}/completions` or
//! `{base_url}/chat/completions` and exposes the chunked body as a
//! [`ByteStream`]. Error statuses keep their body attached so the resolver
//! can read a streamed error payload.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderValue};
use tracing::debug;

use crate::bot::config::BotConfig;
use crate::bot::request::CompletionRequest;
use crate::bot::transport::{ByteStream, Transport, TransportFailure};
use crate::error::BotError;

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &BotConfig) -> Result<Self, BotError> {
        Self::with_timeout(&config.api_key, &config.base_url, config.connect_timeout)
    }

    /// Creates a transport for `base_url` with the given connect timeout.
    ///
    /// No overall request timeout is set: streams may legitimately run for
    /// minutes.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Client`] if the HTTP client cannot be built.
    pub fn with_timeout(
        api_key: &str,
        base_url: &str,
        connect_timeout: Duration,
    ) -> Result<Self, BotError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| BotError::Client {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for `request`.
    #[must_use]
    pub fn url_for(&self, request: &CompletionRequest) -> String {
        format!("{}/{}", self.base_url, request.shape().endpoint())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("client", &"<reqwest::Client>")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn issue(&self, request: &CompletionRequest) -> Result<ByteStream, TransportFailure> {
        let url = self.url_for(request);
        debug!(url = %url, model = request.model(), "opening stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(request)
            .send()
            .await
            .map_err(|e| TransportFailure::network(e.to_string()))?;

        let status = response.status();
        let body: ByteStream = Box::pin(response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportFailure::network(format!("stream error: {e}")))
        }));

        if !status.is_success() {
            debug!(status = status.as_u16(), "server rejected request");
            return Err(TransportFailure::with_response(
                format!("server responded with {status}"),
                status.as_u16(),
                body,
            ));
        }

        Ok(body)
    }
}
