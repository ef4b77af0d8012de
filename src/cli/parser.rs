//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// hexbot: streaming completions and chat against OpenAI-compatible APIs.
///
/// Reads the API key from `HEXBOT_API_KEY` (or `OPENAI_API_KEY`).
#[derive(Parser, Debug)]
#[command(name = "hexbot")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the preset file.
    ///
    /// Defaults to `~/.hexbot/presets.json`.
    #[arg(long, env = "HEXBOT_PRESETS_PATH", global = true)]
    pub presets: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Sampling overrides shared by bot commands.
#[derive(Args, Debug, Clone, Default)]
pub struct SamplingArgs {
    /// Model identifier (e.g. gpt-4o-mini, text-davinci-003).
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature (0.0-2.0).
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate.
    #[arg(long, conflicts_with = "unlimited")]
    pub max_tokens: Option<u32>,

    /// Remove the token cap.
    #[arg(long)]
    pub unlimited: bool,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a completion bot on TEXT and stream the answer.
    #[command(after_help = r#"Examples:
  hexbot complete "Rust"                                      # Default prompt
  hexbot complete "Rust" --prompt "A haiku about {{ input }}"
  hexbot complete "Bonjour" --preset 1b4e28ba-...             # Use a saved preset
  hexbot --format json complete "Rust" | jq -r .answer
"#)]
    Complete {
        /// Input substituted into the prompt template.
        text: String,

        /// Prompt template; `{{ input }}` marks where TEXT goes.
        #[arg(short, long)]
        prompt: Option<String>,

        /// Preset ID to start from.
        #[arg(long)]
        preset: Option<String>,

        #[command(flatten)]
        sampling: SamplingArgs,
    },

    /// Chat with a bot.
    ///
    /// With MESSAGE, sends one message and exits. Without, reads messages
    /// line by line from stdin; `/reset` clears the conversation.
    #[command(after_help = r#"Examples:
  hexbot chat "What is a monad?"
  hexbot chat --system "Answer in one sentence."
  hexbot chat --preset 1b4e28ba-... < questions.txt
"#)]
    Chat {
        /// Single message to send.
        message: Option<String>,

        /// Preset ID to start from.
        #[arg(long)]
        preset: Option<String>,

        /// System prompt, replacing the preset's or the default one.
        #[arg(short, long)]
        system: Option<String>,

        #[command(flatten)]
        sampling: SamplingArgs,
    },

    /// Preset operations (list, show, create, rename, remove).
    #[command(subcommand)]
    Preset(PresetCommands),

    /// Print the built-in defaults for a bot type.
    Defaults {
        /// Bot type: completion or chat.
        #[arg(default_value = "completion")]
        kind: String,
    },
}

/// Preset subcommands.
#[derive(Subcommand, Debug)]
pub enum PresetCommands {
    /// List all presets.
    List,

    /// Show a preset.
    Show {
        /// Preset ID.
        id: String,
    },

    /// Create a preset.
    #[command(after_help = r#"Examples:
  hexbot preset create Translator --prompt "Translate to French: {{ input }}"
  hexbot preset create Tutor --kind chat --system "You are a patient tutor."
"#)]
    Create {
        /// Preset name.
        name: String,

        /// Bot type: completion or chat.
        #[arg(short, long, default_value = "completion")]
        kind: String,

        /// Prompt template (completion presets).
        #[arg(short, long)]
        prompt: Option<String>,

        /// System prompt (chat presets).
        #[arg(short, long)]
        system: Option<String>,

        #[command(flatten)]
        sampling: SamplingArgs,
    },

    /// Rename a preset.
    Rename {
        /// Preset ID.
        id: String,

        /// New name.
        name: String,
    },

    /// Remove a preset.
    Remove {
        /// Preset ID.
        id: String,
    },
}

impl Cli {
    /// Returns the preset file path, using the default if not specified.
    #[must_use]
    pub fn presets_path(&self) -> Option<PathBuf> {
        self.presets
            .clone()
            .or_else(crate::bot::config::default_presets_path)
    }
}
