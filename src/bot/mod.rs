//! Streaming text-generation client.
//!
//! Sends completion or chat requests to an OpenAI-compatible API with
//! `stream: true`, decodes the server-sent event body into text deltas and
//! hands them to callers as live chunks and as a final string.
//!
//! # Architecture
//!
//! ```text
//! BotSettings + input → RequestBuilder → CompletionRequest
//!   └── Transport::issue
//!       ├── Ok(ByteStream)  → StreamDecoder → StreamSink::on_chunk … → text
//!       └── Err(failure)    → resolve_failure → BotError
//! ```
//!
//! [`ChatSession`] additionally owns a [`ConversationContext`] that grows by
//! one user/assistant pair per successful exchange.

pub mod client;
pub mod config;
pub mod context;
pub mod decoder;
pub mod message;
pub mod request;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod transport;
pub mod transports;

// Re-export key types
pub use client::{BotClient, create_transport};
pub use config::BotConfig;
pub use context::{Checkpoint, ConversationContext};
pub use decoder::{DecodeStatus, StreamDecoder, StreamSink};
pub use message::{Message, Role};
pub use request::{CompletionRequest, RequestBuilder, RoleNames, WireShape};
pub use resolver::resolve_failure;
pub use session::{ChatSession, CompletionSession};
pub use settings::{
    BotKind, BotSettings, BuiltinDefaults, ChatBotSettings, CompletionBotSettings,
    DefaultsProvider, TokenCap,
};
pub use transport::{ByteStream, Transport, TransportFailure};
