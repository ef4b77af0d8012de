//! Output formatting for CLI commands.

use std::fmt::Write;

use serde::Serialize;

use crate::bot::settings::{BotSettings, TokenCap};
use crate::preset::BotPreset;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name, falling back to [`OutputFormat::Text`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as JSON with a trailing newline.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value)
            .map(|mut json| {
                json.push('\n');
                json
            })
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}\n"))
    }

    /// Returns true when chunks should be written to stdout as they arrive.
    #[must_use]
    pub const fn streams(self) -> bool {
        matches!(self, Self::Text)
    }
}

/// Formats a list of presets.
#[must_use]
pub fn format_preset_list(presets: &[BotPreset], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format.to_json(presets),
        OutputFormat::Text => {
            if presets.is_empty() {
                return "No presets.\n".to_string();
            }
            let mut output = String::new();
            for preset in presets {
                let _ = writeln!(
                    output,
                    "{}  {:<10} {}  (last used {})",
                    preset.id,
                    preset.settings.kind().to_string(),
                    preset.name,
                    preset.last_used_at.format("%Y-%m-%d %H:%M")
                );
            }
            output
        }
    }
}

/// Formats a single preset.
#[must_use]
pub fn format_preset(preset: &BotPreset, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format.to_json(preset),
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Preset: {}", preset.name);
            let _ = writeln!(output, "  ID:        {}", preset.id);
            let _ = writeln!(output, "  Created:   {}", preset.created_at.to_rfc3339());
            let _ = writeln!(output, "  Updated:   {}", preset.updated_at.to_rfc3339());
            let _ = writeln!(output, "  Last used: {}", preset.last_used_at.to_rfc3339());
            output.push_str(&format_settings(&preset.settings, OutputFormat::Text));
            output
        }
    }
}

/// Formats bot settings.
#[must_use]
pub fn format_settings(settings: &BotSettings, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return format.to_json(settings);
    }

    let mut output = String::new();
    let _ = writeln!(output, "  Type:        {}", settings.kind());
    let _ = writeln!(output, "  Model:       {}", settings.model().unwrap_or("(default)"));
    let _ = writeln!(
        output,
        "  Temperature: {}",
        settings
            .temperature()
            .map_or_else(|| "(default)".to_string(), |t| t.to_string())
    );
    let _ = writeln!(
        output,
        "  Max tokens:  {}",
        match settings.max_tokens() {
            None => "(default)".to_string(),
            Some(TokenCap::Unlimited) => "unlimited".to_string(),
            Some(TokenCap::Limit(n)) => n.to_string(),
        }
    );
    match settings {
        BotSettings::Completion(s) => {
            let _ = writeln!(output, "  Prompt:      {}", s.prompt);
        }
        BotSettings::Chat(s) => {
            let _ = writeln!(output, "  Messages:");
            for message in &s.messages {
                let _ = writeln!(output, "    [{}] {}", message.role, message.content);
            }
        }
    }
    output
}

/// Result of a completion or single chat exchange.
#[derive(Debug, Serialize)]
pub struct AnswerOutput<'a> {
    /// Bot type that produced the answer.
    #[serde(rename = "type")]
    pub kind: &'a str,
    /// Preset used, if any.
    pub preset: Option<&'a str>,
    /// Final answer text.
    pub answer: &'a str,
    /// Whether the answer already reached stdout chunk by chunk.
    #[serde(skip)]
    pub streamed: bool,
}

/// Formats a final answer.
///
/// In text mode a streamed answer is already on screen, so only the closing
/// newline is returned. Otherwise, as for the blank-stream placeholders, the
/// answer itself is printed.
#[must_use]
pub fn format_answer(answer: &AnswerOutput<'_>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text if answer.streamed => "\n".to_string(),
        OutputFormat::Text => format!("{}\n", answer.answer),
        OutputFormat::Json => format.to_json(answer),
    }
}
