//! Bot sessions.
//!
//! A session builds a request, issues it through a [`Transport`], pipes the
//! body through a [`StreamDecoder`] and reports chunks to an optional
//! callback. [`CompletionSession`] is stateless across calls;
//! [`ChatSession`] owns a [`ConversationContext`].
//!
//! ```text
//! send(text) → RequestBuilder → Transport::issue
//!   ├── Ok(body)  → StreamDecoder::feed per buffer → on_chunk … → final text
//!   └── Err(fail) → resolve_failure (≤ 300 ms) → BotError
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tracing::{debug, info};

use super::context::{ConversationContext, PendingExchange};
use super::decoder::{StreamDecoder, StreamSink};
use super::request::{CompletionRequest, RequestBuilder};
use super::resolver::{DEFAULT_RESOLVE_TIMEOUT, resolve_failure};
use super::settings::{ChatBotSettings, CompletionBotSettings};
use super::transport::Transport;
use crate::error::BotError;

/// Returned by a completion session when the stream carried no text.
pub const NO_RESPONSE: &str = "(no response)";
/// Recorded and returned by a chat session when the stream carried no text.
pub const NO_ANSWER: &str = "Sorry, I'm not able to answer.";

/// Caller-supplied chunk callback.
pub type ChunkCallback = Box<dyn FnMut(&str) + Send>;

/// Forwards decoded chunks to the caller and, optionally, into the
/// placeholder reply of a conversation.
struct ForwardingSink<'a, 'c> {
    on_chunk: Option<&'a mut ChunkCallback>,
    echo: Option<&'a mut PendingExchange<'c>>,
}

impl StreamSink for ForwardingSink<'_, '_> {
    fn on_chunk(&mut self, chunk: &str) {
        if let Some(pending) = self.echo.as_deref_mut() {
            pending.append_to_reply(chunk);
        }
        if let Some(callback) = self.on_chunk.as_deref_mut() {
            callback(chunk);
        }
    }

    fn on_complete(&mut self, full_text: &str) {
        debug!(len = full_text.len(), "stream finished");
    }
}

/// Issues `request` and decodes its body until the terminal token.
///
/// Every transport rejection, including one surfacing mid-stream, is
/// resolved through [`resolve_failure`].
async fn stream_request<S: StreamSink>(
    transport: &dyn Transport,
    request: &CompletionRequest,
    resolve_timeout: Duration,
    sink: &mut S,
) -> Result<String, BotError> {
    let mut body = match transport.issue(request).await {
        Ok(body) => body,
        Err(failure) => return Err(resolve_failure(failure, resolve_timeout).await),
    };

    let mut decoder = StreamDecoder::for_shape(request.shape());
    while let Some(item) = body.next().await {
        let buffer = match item {
            Ok(buffer) => buffer,
            Err(failure) => return Err(resolve_failure(failure, resolve_timeout).await),
        };
        if decoder.feed(&buffer, sink).is_done() {
            return Ok(decoder.into_text());
        }
    }

    Err(BotError::IncompleteStream {
        received: decoder.text().len(),
    })
}

/// Stateless session for prompt completions.
pub struct CompletionSession {
    transport: Arc<dyn Transport>,
    builder: RequestBuilder,
    resolve_timeout: Duration,
    on_chunk: Option<ChunkCallback>,
}

impl std::fmt::Debug for CompletionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSession")
            .field("transport", &self.transport.name())
            .field("builder", &self.builder)
            .field("resolve_timeout", &self.resolve_timeout)
            .finish_non_exhaustive()
    }
}

impl CompletionSession {
    /// Creates a session sending through `transport`.
    pub fn new(transport: Arc<dyn Transport>, builder: RequestBuilder) -> Self {
        Self {
            transport,
            builder,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            on_chunk: None,
        }
    }

    /// Registers a callback invoked with every decoded chunk.
    #[must_use]
    pub fn with_on_chunk(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_chunk = Some(Box::new(callback));
        self
    }

    /// Sets how long to wait for a streamed error body.
    #[must_use]
    pub const fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Sends `text` through the prompt template in `settings`.
    ///
    /// Returns the concatenated streamed text, or [`NO_RESPONSE`] if the
    /// stream carried none.
    ///
    /// # Errors
    ///
    /// Returns the resolved [`BotError`] if the request fails.
    pub async fn send(
        &mut self,
        text: &str,
        settings: &CompletionBotSettings,
    ) -> Result<String, BotError> {
        let request = self.builder.completion(text, settings);
        info!(model = request.model(), shape = ?request.shape(), "sending completion request");

        let mut sink = ForwardingSink {
            on_chunk: self.on_chunk.as_mut(),
            echo: None,
        };
        let answer = stream_request(
            self.transport.as_ref(),
            &request,
            self.resolve_timeout,
            &mut sink,
        )
        .await?;

        if answer.is_empty() {
            Ok(NO_RESPONSE.to_string())
        } else {
            Ok(answer)
        }
    }
}

/// Stateful session for multi-turn chat.
pub struct ChatSession {
    transport: Arc<dyn Transport>,
    builder: RequestBuilder,
    resolve_timeout: Duration,
    on_chunk: Option<ChunkCallback>,
    context: ConversationContext,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("transport", &self.transport.name())
            .field("builder", &self.builder)
            .field("resolve_timeout", &self.resolve_timeout)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Creates a session with an empty conversation.
    pub fn new(transport: Arc<dyn Transport>, builder: RequestBuilder) -> Self {
        Self {
            transport,
            builder,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            on_chunk: None,
            context: ConversationContext::new(),
        }
    }

    /// Registers a callback invoked with every decoded chunk.
    #[must_use]
    pub fn with_on_chunk(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_chunk = Some(Box::new(callback));
        self
    }

    /// Sets how long to wait for a streamed error body.
    #[must_use]
    pub const fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Conversation recorded so far.
    #[must_use]
    pub const fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Forgets the conversation.
    pub fn reset(&mut self) {
        self.context.clear();
    }

    /// Sends `message` and records the exchange once the answer is complete.
    ///
    /// # Errors
    ///
    /// Returns the resolved [`BotError`] if the request fails; the
    /// conversation is left unchanged.
    pub async fn send(
        &mut self,
        message: &str,
        settings: &ChatBotSettings,
    ) -> Result<String, BotError> {
        let request = self
            .builder
            .chat(self.context.messages(), message, settings);
        info!(model = request.model(), history = self.context.len(), "sending chat request");

        let mut sink = ForwardingSink {
            on_chunk: self.on_chunk.as_mut(),
            echo: None,
        };
        let answer = stream_request(
            self.transport.as_ref(),
            &request,
            self.resolve_timeout,
            &mut sink,
        )
        .await?;

        let answer = non_blank_answer(answer);
        self.context.push_exchange(message, &answer);
        Ok(answer)
    }

    /// Sends `message`, recording it and an empty reply up front.
    ///
    /// Chunks are appended to the recorded reply as they arrive, so callers
    /// rendering [`ChatSession::context`] see the answer grow. On failure,
    /// or if the returned future is dropped before completing, both
    /// tentative entries are removed.
    ///
    /// # Errors
    ///
    /// Returns the resolved [`BotError`] if the request fails.
    pub async fn send_optimistic(
        &mut self,
        message: &str,
        settings: &ChatBotSettings,
    ) -> Result<String, BotError> {
        let request = self
            .builder
            .chat(self.context.messages(), message, settings);
        info!(model = request.model(), history = self.context.len(), "sending chat request");

        let mut pending = self.context.begin_pending(message);
        let mut sink = ForwardingSink {
            on_chunk: self.on_chunk.as_mut(),
            echo: Some(&mut pending),
        };
        let result = stream_request(
            self.transport.as_ref(),
            &request,
            self.resolve_timeout,
            &mut sink,
        )
        .await;

        match result {
            Ok(answer) => {
                let answer = non_blank_answer(answer);
                pending.commit(&answer);
                Ok(answer)
            }
            Err(e) => {
                debug!(error = %e, "rolling back tentative exchange");
                drop(pending);
                Err(e)
            }
        }
    }
}

/// Only an empty stream counts as blank; whitespace is a real answer.
fn non_blank_answer(answer: String) -> String {
    if answer.is_empty() {
        NO_ANSWER.to_string()
    } else {
        answer
    }
}
