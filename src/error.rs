//! Error types for hexbot.
//!
//! Each concern owns a `thiserror` enum; [`Error`] unifies them for the
//! CLI layer.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Failure talking to the generation backend.
    #[error(transparent)]
    Bot(#[from] BotError),

    /// Preset store failure.
    #[error(transparent)]
    Preset(#[from] PresetError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors surfaced by bot sessions and the streaming client.
///
/// A failed `send` produces exactly one of these, always routed through
/// [`crate::bot::resolver::resolve_failure`] first.
#[derive(Debug, Error)]
pub enum BotError {
    /// Network-level failure with no server response.
    #[error("request failed: {message}")]
    Transport {
        /// Message of the underlying failure.
        message: String,
    },

    /// The server answered with an error status but no readable body
    /// arrived in time.
    #[error("request failed with status {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Message of the underlying failure.
        message: String,
    },

    /// The server streamed a structured error body.
    #[error("{message}")]
    StreamedServer {
        /// HTTP status code, when known.
        status: Option<u16>,
        /// Message extracted from the error payload.
        message: String,
    },

    /// The transport closed before the terminal marker was received.
    #[error("stream ended before completion marker ({received} bytes of text received)")]
    IncompleteStream {
        /// Length of the text decoded before the stream closed.
        received: usize,
    },

    /// No API key was configured.
    #[error("API key not configured: set HEXBOT_API_KEY or OPENAI_API_KEY")]
    ApiKeyMissing,

    /// Unknown transport name in configuration.
    #[error("unsupported transport: {name}")]
    UnsupportedTransport {
        /// The requested transport name.
        name: String,
    },

    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {message}")]
    Client {
        /// Underlying error message.
        message: String,
    },
}

impl BotError {
    /// Human-readable message without the variant prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Transport { message }
            | Self::Http { message, .. }
            | Self::StreamedServer { message, .. }
            | Self::Client { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status attached to the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::StreamedServer { status, .. } => *status,
            _ => None,
        }
    }
}

/// Errors from the preset store.
#[derive(Debug, Error)]
pub enum PresetError {
    /// No preset with the given id.
    #[error("preset with id {id} not found")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// Reading or writing the preset file failed.
    #[error("preset file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The preset file could not be parsed or serialized.
    #[error("preset file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A command-line argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The command could not complete.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Output could not be formatted.
    #[error("output formatting failed: {0}")]
    OutputFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streamed_server_display_is_bare_message() {
        let err = BotError::StreamedServer {
            status: Some(429),
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "rate limited");
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_transport_message_accessor() {
        let err = BotError::Transport {
            message: "connection refused".to_string(),
        };
        assert_eq!(err.message(), "connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_not_found_converts_to_crate_error() {
        let err: Error = PresetError::NotFound {
            id: "abc".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "preset with id abc not found");
    }
}
