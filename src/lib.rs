//! # hexbot
//!
//! Streaming client for OpenAI-compatible completion and chat APIs.
//!
//! The [`bot`] module holds the request builder, the server-sent event
//! decoder, the error resolver and the sessions. [`preset`] persists named
//! bot settings, and [`cli`] exposes both through the `hexbot` binary.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hexbot::bot::{BotClient, BotConfig, BuiltinDefaults, CompletionBotSettings};
//!
//! # async fn run() -> hexbot::Result<()> {
//! let config = BotConfig::from_env()?;
//! let client = BotClient::new(config, Arc::new(BuiltinDefaults))?;
//! let mut session = client
//!     .completion_session()
//!     .with_on_chunk(|chunk| eprint!("{chunk}"));
//! let answer = session
//!     .send("Rust", &CompletionBotSettings::new("Write a haiku about {{ input }}"))
//!     .await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

pub mod bot;
pub mod cli;
pub mod error;
pub mod preset;

pub use error::{BotError, CommandError, Error, PresetError, Result};
pub use preset::{BotPreset, JsonPresetStore, PresetPatch, PresetStore};
