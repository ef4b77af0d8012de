//! Pluggable transport trait.
//!
//! A transport opens the chunked HTTP connection for a
//! [`CompletionRequest`] and hands back the raw body as a byte stream.
//! Decoding and error resolution stay in the session layer, so tests can
//! drive sessions with scripted transports.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::request::CompletionRequest;

/// Raw response body, one item per buffer the network delivers.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportFailure>> + Send>>;

/// Response attached to a failed request.
pub struct FailedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Live response body; may still be streaming.
    pub body: ByteStream,
}

impl fmt::Debug for FailedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailedResponse")
            .field("status", &self.status)
            .field("body", &"<byte stream>")
            .finish()
    }
}

/// A rejected request.
///
/// `response` is `None` for network-level failures where the server never
/// answered.
#[derive(Debug)]
pub struct TransportFailure {
    /// Message of the underlying failure.
    pub message: String,
    /// Server response, if one was received.
    pub response: Option<FailedResponse>,
}

impl TransportFailure {
    /// Creates a failure with no server response.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    /// Creates a failure carrying the server's status and body.
    pub fn with_response(message: impl Into<String>, status: u16, body: ByteStream) -> Self {
        Self {
            message: message.into(),
            response: Some(FailedResponse { status, body }),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.response {
            Some(response) => write!(f, "{} (status {})", self.message, response.status),
            None => f.write_str(&self.message),
        }
    }
}

/// Trait for transport backends.
///
/// Implementations always request incremental delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name (e.g., `"http"`).
    fn name(&self) -> &'static str;

    /// Sends `request`, returning the body stream on a successful status.
    ///
    /// # Errors
    ///
    /// Returns [`TransportFailure`] when the connection fails or the server
    /// answers with an error status.
    async fn issue(&self, request: &CompletionRequest) -> Result<ByteStream, TransportFailure>;
}
