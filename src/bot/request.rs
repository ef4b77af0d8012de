//! Completion request builder.
//!
//! Turns user text plus [`BotSettings`](super::settings::BotSettings) into
//! the exact outbound payload. Building is pure: the only outside input is
//! the [`DefaultsProvider`], which is read once per request.

use std::sync::{Arc, LazyLock};

use regex::{NoExpand, Regex, RegexBuilder};
use serde::Serialize;
use tracing::debug;

use super::message::{Message, Role, user_message};
use super::settings::{
    ChatBotSettings, CompletionBotSettings, DEFAULT_CHAT_MODEL, DefaultsProvider,
    LEGACY_COMPLETION_MODEL, TokenCap,
};

/// Token cap sent on the legacy shape when no limit is configured.
///
/// The legacy endpoint requires a number and would otherwise cut answers
/// at its own small default.
pub const LEGACY_DEFAULT_MAX_TOKENS: u32 = 1024;

/// Separator inserted between a template without placeholder and the input.
pub const INPUT_SEPARATOR: &str = "\n\n";

static INPUT_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\{\{\s*input\s*\}\}")
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|_| unreachable!())
});

/// Returns true if `template` contains an input placeholder
/// (`{{input}}`, `{{ input }}`, any case or inner whitespace).
#[must_use]
pub fn has_input_placeholder(template: &str) -> bool {
    INPUT_PLACEHOLDER.is_match(template)
}

/// Substitutes `input` into `template`.
///
/// Every placeholder occurrence is replaced verbatim. A template without a
/// placeholder gets the input appended after a blank line instead.
#[must_use]
pub fn render_prompt(template: &str, input: &str) -> String {
    if has_input_placeholder(template) {
        INPUT_PLACEHOLDER
            .replace_all(template, NoExpand(input))
            .into_owned()
    } else {
        format!("{template}{INPUT_SEPARATOR}{input}")
    }
}

/// Which of the two wire formats a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    /// Legacy single-prompt completion (`choices[0].text`).
    Completion,
    /// Chat completion (`choices[0].delta.content`).
    Chat,
}

impl WireShape {
    /// Endpoint path relative to the API base URL.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Completion => "completions",
            Self::Chat => "chat/completions",
        }
    }
}

/// Legacy completion payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyCompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Fully rendered prompt.
    pub prompt: String,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Token cap (always numeric on this shape).
    pub max_tokens: u32,
    /// Incremental delivery flag.
    pub stream: bool,
}

/// Message as it appears in a chat payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Message content.
    pub content: String,
    /// Display name (never set for system messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Chat completion payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<WireMessage>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Token cap; omitted for no limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Incremental delivery flag.
    pub stream: bool,
}

/// A fully formed outbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CompletionRequest {
    /// Legacy single-prompt request.
    Legacy(LegacyCompletionRequest),
    /// Chat request.
    Chat(ChatCompletionRequest),
}

impl CompletionRequest {
    /// Wire shape of this request.
    #[must_use]
    pub const fn shape(&self) -> WireShape {
        match self {
            Self::Legacy(_) => WireShape::Completion,
            Self::Chat(_) => WireShape::Chat,
        }
    }

    /// Model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::Legacy(r) => &r.model,
            Self::Chat(r) => &r.model,
        }
    }

    /// Sampling temperature.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        match self {
            Self::Legacy(r) => r.temperature,
            Self::Chat(r) => r.temperature,
        }
    }

    /// Numeric token cap sent on the wire, if any.
    #[must_use]
    pub const fn max_tokens(&self) -> Option<u32> {
        match self {
            Self::Legacy(r) => Some(r.max_tokens),
            Self::Chat(r) => r.max_tokens,
        }
    }
}

/// Display names attached to non-system chat messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleNames {
    /// Name for `user` messages.
    pub user: Option<String>,
    /// Name for `assistant` messages.
    pub assistant: Option<String>,
}

impl RoleNames {
    /// Name configured for `role`, if any.
    #[must_use]
    pub fn for_role(&self, role: Role) -> Option<&str> {
        match role {
            Role::System => None,
            Role::User => self.user.as_deref(),
            Role::Assistant => self.assistant.as_deref(),
        }
    }

    fn annotate(&self, message: Message) -> WireMessage {
        let name = match message.role {
            Role::System => None,
            role => self.for_role(role).map(String::from).or(message.name),
        };
        WireMessage {
            role: message.role,
            content: message.content,
            name,
        }
    }
}

/// Builds outbound requests from settings and user input.
#[derive(Clone)]
pub struct RequestBuilder {
    defaults: Arc<dyn DefaultsProvider>,
    names: RoleNames,
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("defaults", &"<dyn DefaultsProvider>")
            .field("names", &self.names)
            .finish()
    }
}

impl RequestBuilder {
    /// Creates a builder backed by `defaults`.
    pub fn new(defaults: Arc<dyn DefaultsProvider>) -> Self {
        Self {
            defaults,
            names: RoleNames::default(),
        }
    }

    /// Sets the display names used for chat messages.
    #[must_use]
    pub fn with_role_names(mut self, names: RoleNames) -> Self {
        self.names = names;
        self
    }

    /// Display names used for chat messages.
    #[must_use]
    pub const fn role_names(&self) -> &RoleNames {
        &self.names
    }

    /// Builds a request for a completion bot.
    ///
    /// The legacy model routes to the single-prompt shape; any other model
    /// gets a chat request with one synthetic user message.
    pub fn completion(&self, text: &str, settings: &CompletionBotSettings) -> CompletionRequest {
        let defaults = self.defaults.completion_defaults();
        let prompt = render_prompt(&settings.prompt, text);
        let model = settings
            .model
            .clone()
            .or(defaults.model)
            .unwrap_or_else(|| LEGACY_COMPLETION_MODEL.to_string());
        let temperature = settings.temperature.or(defaults.temperature);
        let cap = resolve_cap(settings.max_tokens, defaults.max_tokens);

        let request = if model == LEGACY_COMPLETION_MODEL {
            CompletionRequest::Legacy(LegacyCompletionRequest {
                model,
                prompt,
                temperature,
                max_tokens: cap
                    .limit()
                    .filter(|&n| n > 0)
                    .unwrap_or(LEGACY_DEFAULT_MAX_TOKENS),
                stream: true,
            })
        } else {
            CompletionRequest::Chat(ChatCompletionRequest {
                model,
                messages: vec![WireMessage {
                    role: Role::User,
                    content: prompt,
                    name: None,
                }],
                temperature,
                max_tokens: cap.limit(),
                stream: true,
            })
        };

        debug!(
            model = request.model(),
            shape = ?request.shape(),
            temperature = ?request.temperature(),
            max_tokens = ?request.max_tokens(),
            "built completion request"
        );
        request
    }

    /// Builds a chat request from leading settings messages, the session
    /// history and the new user message.
    ///
    /// Only the first system message is kept.
    pub fn chat(
        &self,
        history: &[Message],
        message: &str,
        settings: &ChatBotSettings,
    ) -> CompletionRequest {
        let defaults = self.defaults.chat_defaults();
        let model = settings
            .model
            .clone()
            .or(defaults.model)
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let temperature = settings.temperature.or(defaults.temperature);
        let cap = resolve_cap(settings.max_tokens, defaults.max_tokens);

        let mut seen_system = false;
        let messages: Vec<WireMessage> = settings
            .messages
            .iter()
            .chain(history)
            .cloned()
            .chain(std::iter::once(user_message(message)))
            .filter(|m| {
                if m.role != Role::System {
                    return true;
                }
                if seen_system {
                    debug!("dropping additional system message");
                    return false;
                }
                seen_system = true;
                true
            })
            .map(|m| self.names.annotate(m))
            .collect();

        debug!(
            model = %model,
            messages = messages.len(),
            temperature = ?temperature,
            "built chat request"
        );

        CompletionRequest::Chat(ChatCompletionRequest {
            model,
            messages,
            temperature,
            max_tokens: cap.limit(),
            stream: true,
        })
    }
}

fn resolve_cap(explicit: Option<TokenCap>, fallback: Option<TokenCap>) -> TokenCap {
    explicit.or(fallback).unwrap_or(TokenCap::Unlimited)
}
