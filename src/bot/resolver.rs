//! Stream error resolution.
//!
//! A rejected request may still be streaming an error body. The resolver
//! races the first body buffer against a short timer and turns whichever
//! finishes first into a single [`BotError`].

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tracing::debug;

use super::decoder::DATA_PREFIX;
use super::transport::{FailedResponse, TransportFailure};
use crate::error::BotError;

/// How long to wait for a streamed error body.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_millis(300);

/// Resolves a failed request into the most specific error available
/// within `wait`.
///
/// Never fails: the result is always a well-formed [`BotError`].
pub async fn resolve_failure(failure: TransportFailure, wait: Duration) -> BotError {
    let TransportFailure { message, response } = failure;

    let Some(FailedResponse { status, mut body }) = response else {
        return BotError::Transport { message };
    };

    // Dropping the losing branch cancels its timer or pending read.
    let first = tokio::select! {
        item = body.next() => Some(item),
        () = tokio::time::sleep(wait) => None,
    };

    match first {
        Some(Some(Ok(buffer))) => {
            let message = error_message(&buffer);
            debug!(status, message = %message, "resolved streamed server error");
            BotError::StreamedServer {
                status: Some(status),
                message,
            }
        }
        Some(Some(Err(e))) => {
            debug!(status, error = %e, "error body failed to stream");
            BotError::Http { status, message }
        }
        Some(None) => {
            debug!(status, "error body was empty");
            BotError::Http { status, message }
        }
        None => {
            debug!(status, wait_ms = wait.as_millis(), "no error body before timeout");
            BotError::Http { status, message }
        }
    }
}

/// Extracts `error.message` from an error body, falling back to the raw
/// text.
fn error_message(buffer: &[u8]) -> String {
    let text = String::from_utf8_lossy(buffer);
    let raw = text.trim();
    let payload = raw.strip_prefix(DATA_PREFIX).unwrap_or(raw).trim();

    serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(String::from))
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::transport::ByteStream;
    use futures_util::stream;
    use std::time::Instant;

    fn body_from(buffers: Vec<&'static str>) -> ByteStream {
        Box::pin(stream::iter(
            buffers
                .into_iter()
                .map(|b| Ok::<_, TransportFailure>(b.as_bytes().to_vec())),
        ))
    }

    #[tokio::test]
    async fn test_no_response_resolves_immediately() {
        let start = Instant::now();
        let err = resolve_failure(
            TransportFailure::network("connection refused"),
            DEFAULT_RESOLVE_TIMEOUT,
        )
        .await;
        assert!(matches!(err, BotError::Transport { ref message } if message == "connection refused"));
        assert!(start.elapsed() < DEFAULT_RESOLVE_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streamed_error_message_extracted() {
        let body = body_from(vec![r#"data: {"error":{"message":"rate limited"}}"#]);
        let start = tokio::time::Instant::now();

        let err = resolve_failure(
            TransportFailure::with_response("status 429", 429, body),
            DEFAULT_RESOLVE_TIMEOUT,
        )
        .await;

        assert_eq!(err.to_string(), "rate limited");
        assert_eq!(err.status(), Some(429));
        assert!(start.elapsed() < DEFAULT_RESOLVE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_plain_json_error_body() {
        let body = body_from(vec![r#"{"error":{"message":"invalid api key","type":"auth"}}"#]);
        let err = resolve_failure(
            TransportFailure::with_response("status 401", 401, body),
            DEFAULT_RESOLVE_TIMEOUT,
        )
        .await;
        assert_eq!(err.message(), "invalid api key");
    }

    #[tokio::test]
    async fn test_unparsable_body_uses_raw_text() {
        let body = body_from(vec!["Bad Gateway\n"]);
        let err = resolve_failure(
            TransportFailure::with_response("status 502", 502, body),
            DEFAULT_RESOLVE_TIMEOUT,
        )
        .await;
        assert!(matches!(err, BotError::StreamedServer { ref message, .. } if message == "Bad Gateway"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_body_falls_back_after_timeout() {
        let body: ByteStream = Box::pin(stream::pending::<Result<Vec<u8>, TransportFailure>>());
        let start = tokio::time::Instant::now();

        let err = resolve_failure(
            TransportFailure::with_response("server error", 500, body),
            DEFAULT_RESOLVE_TIMEOUT,
        )
        .await;

        assert!(start.elapsed() >= DEFAULT_RESOLVE_TIMEOUT);
        assert!(
            matches!(err, BotError::Http { status: 500, ref message } if message == "server error")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_body_is_ignored() {
        let late = stream::once(async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, TransportFailure>(br#"{"error":{"message":"too late"}}"#.to_vec())
        });
        let body: ByteStream = Box::pin(late);

        let err = resolve_failure(
            TransportFailure::with_response("server error", 503, body),
            DEFAULT_RESOLVE_TIMEOUT,
        )
        .await;

        assert!(matches!(err, BotError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_empty_body_falls_back() {
        let err = resolve_failure(
            TransportFailure::with_response("server error", 500, body_from(Vec::new())),
            DEFAULT_RESOLVE_TIMEOUT,
        )
        .await;
        assert!(matches!(err, BotError::Http { status: 500, .. }));
    }
}
