//! Bot settings and the defaults they fall back to.
//!
//! Settings are read from caller-managed storage (presets or CLI flags)
//! before each call and never mutated by a session.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::message::{Message, assistant_message, system_message, user_message};

/// Model identifier that routes to the legacy single-prompt wire shape.
pub const LEGACY_COMPLETION_MODEL: &str = "text-davinci-003";
/// Model used for chat requests when neither settings nor defaults name one.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
/// Default sampling temperature for both bot types.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Prompt template used when no completion settings are stored.
pub const DEFAULT_COMPLETION_PROMPT: &str = "{{ input }}";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant called 'Hex'. \
Your answers are short and precise, preferably in bullet points. \
If you need more context to give a precise response, ask for it.";

/// Output token cap.
///
/// Stored as a nullable number: `null` means an explicit "no limit",
/// which is distinct from leaving the field out (use the default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCap {
    /// No limit requested.
    Unlimited,
    /// At most this many tokens.
    Limit(u32),
}

impl TokenCap {
    /// Returns the numeric limit, if any.
    #[must_use]
    pub const fn limit(self) -> Option<u32> {
        match self {
            Self::Unlimited => None,
            Self::Limit(n) => Some(n),
        }
    }
}

impl From<Option<u32>> for TokenCap {
    fn from(value: Option<u32>) -> Self {
        value.map_or(Self::Unlimited, Self::Limit)
    }
}

impl Serialize for TokenCap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unlimited => serializer.serialize_none(),
            Self::Limit(n) => serializer.serialize_u32(*n),
        }
    }
}

/// Maps a present field to `Some`, keeping `null` as `Some(Unlimited)`.
fn deserialize_token_cap<'de, D>(deserializer: D) -> Result<Option<TokenCap>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u32>::deserialize(deserializer).map(|v| Some(TokenCap::from(v)))
}

/// Settings for a stateless completion bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionBotSettings {
    /// Prompt template; `{{ input }}` marks where user text goes.
    pub prompt: String,
    /// Model identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature (0.0–2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_token_cap"
    )]
    pub max_tokens: Option<TokenCap>,
}

impl CompletionBotSettings {
    /// Creates settings with the given prompt template and no overrides.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Settings for a stateful chat bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBotSettings {
    /// Messages prepended to every request (system prompt, examples).
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Model identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature (0.0–2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_token_cap"
    )]
    pub max_tokens: Option<TokenCap>,
}

impl ChatBotSettings {
    /// Creates settings with the given leading messages and no overrides.
    #[must_use]
    pub const fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Bot type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotKind {
    /// Stateful conversation.
    Chat,
    /// One-shot prompt completion.
    Completion,
}

impl BotKind {
    /// Parses a bot kind name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chat" => Some(Self::Chat),
            "completion" => Some(Self::Completion),
            _ => None,
        }
    }
}

impl std::fmt::Display for BotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => f.write_str("chat"),
            Self::Completion => f.write_str("completion"),
        }
    }
}

/// Settings tagged by bot type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BotSettings {
    /// Chat bot settings.
    Chat(ChatBotSettings),
    /// Completion bot settings.
    Completion(CompletionBotSettings),
}

impl BotSettings {
    /// Returns the bot type of these settings.
    #[must_use]
    pub const fn kind(&self) -> BotKind {
        match self {
            Self::Chat(_) => BotKind::Chat,
            Self::Completion(_) => BotKind::Completion,
        }
    }

    /// Returns the sampling temperature override.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        match self {
            Self::Chat(s) => s.temperature,
            Self::Completion(s) => s.temperature,
        }
    }

    /// Returns the token cap override.
    #[must_use]
    pub const fn max_tokens(&self) -> Option<TokenCap> {
        match self {
            Self::Chat(s) => s.max_tokens,
            Self::Completion(s) => s.max_tokens,
        }
    }

    /// Returns the model override.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Chat(s) => s.model.as_deref(),
            Self::Completion(s) => s.model.as_deref(),
        }
    }
}

/// Supplies fallback values for settings fields left unset.
///
/// Implementations must be side-effect free: the request builder calls
/// them once per request.
pub trait DefaultsProvider: Send + Sync {
    /// Defaults for completion bots.
    fn completion_defaults(&self) -> CompletionBotSettings;

    /// Defaults for chat bots.
    fn chat_defaults(&self) -> ChatBotSettings;
}

/// Compiled-in defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinDefaults;

impl DefaultsProvider for BuiltinDefaults {
    fn completion_defaults(&self) -> CompletionBotSettings {
        CompletionBotSettings {
            prompt: DEFAULT_COMPLETION_PROMPT.to_string(),
            model: Some(LEGACY_COMPLETION_MODEL.to_string()),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: None,
        }
    }

    fn chat_defaults(&self) -> ChatBotSettings {
        ChatBotSettings {
            messages: vec![
                system_message(DEFAULT_SYSTEM_PROMPT),
                user_message("Hello Hex!"),
                assistant_message("Hi, what can I do for you?"),
            ],
            model: Some(DEFAULT_CHAT_MODEL.to_string()),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: None,
        }
    }
}
