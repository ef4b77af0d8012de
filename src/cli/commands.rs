//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tracing::debug;

use crate::bot::client::BotClient;
use crate::bot::config::BotConfig;
use crate::bot::message::{Role, system_message};
use crate::bot::settings::{
    BotKind, BotSettings, BuiltinDefaults, ChatBotSettings, CompletionBotSettings,
    DEFAULT_COMPLETION_PROMPT, DefaultsProvider, TokenCap,
};
use crate::cli::output::{
    AnswerOutput, OutputFormat, format_answer, format_preset, format_preset_list,
    format_settings,
};
use crate::cli::parser::{Cli, Commands, PresetCommands, SamplingArgs};
use crate::error::{CommandError, Result};
use crate::preset::{JsonPresetStore, PresetPatch, PresetStore};

/// Input line that clears the conversation in interactive chat.
const RESET_COMMAND: &str = "/reset";
/// Accepted temperature range.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;

// ==================== Parameter Structs ====================

/// Parameters for the complete command.
#[derive(Debug, Clone, Copy)]
pub struct CompleteParams<'a> {
    /// Input text.
    pub text: &'a str,
    /// Prompt template override.
    pub prompt: Option<&'a str>,
    /// Preset to start from.
    pub preset: Option<&'a str>,
    /// Sampling overrides.
    pub sampling: &'a SamplingArgs,
}

/// Parameters for the chat command.
#[derive(Debug, Clone, Copy)]
pub struct ChatParams<'a> {
    /// Single message; `None` reads stdin.
    pub message: Option<&'a str>,
    /// Preset to start from.
    pub preset: Option<&'a str>,
    /// System prompt override.
    pub system: Option<&'a str>,
    /// Sampling overrides.
    pub sampling: &'a SamplingArgs,
}

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success. In text mode, streamed answers
/// have already been written to stdout.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Complete {
            text,
            prompt,
            preset,
            sampling,
        } => {
            let params = CompleteParams {
                text,
                prompt: prompt.as_deref(),
                preset: preset.as_deref(),
                sampling,
            };
            let store = preset.as_ref().map(|_| open_store(cli)).transpose()?;
            cmd_complete(store.as_ref(), &params, format)
        }
        Commands::Chat {
            message,
            preset,
            system,
            sampling,
        } => {
            let params = ChatParams {
                message: message.as_deref(),
                preset: preset.as_deref(),
                system: system.as_deref(),
                sampling,
            };
            let store = preset.as_ref().map(|_| open_store(cli)).transpose()?;
            cmd_chat(store.as_ref(), &params, format)
        }
        Commands::Preset(cmd) => {
            let store = open_store(cli)?;
            execute_preset(&store, cmd, format)
        }
        Commands::Defaults { kind } => cmd_defaults(kind, format),
    }
}

fn execute_preset(
    store: &impl PresetStore,
    cmd: &PresetCommands,
    format: OutputFormat,
) -> Result<String> {
    match cmd {
        PresetCommands::List => Ok(format_preset_list(&store.read()?, format)),
        PresetCommands::Show { id } => Ok(format_preset(&store.get(id)?, format)),
        PresetCommands::Create {
            name,
            kind,
            prompt,
            system,
            sampling,
        } => cmd_preset_create(
            store,
            name,
            kind,
            prompt.as_deref(),
            system.as_deref(),
            sampling,
            format,
        ),
        PresetCommands::Rename { id, name } => {
            let preset = store.update(id, PresetPatch::rename(name.as_str()))?;
            match format {
                OutputFormat::Text => {
                    Ok(format!("Renamed preset {} to {}\n", preset.id, preset.name))
                }
                OutputFormat::Json => Ok(format.to_json(&preset)),
            }
        }
        PresetCommands::Remove { id } => {
            let remaining = store.remove(id)?;
            match format {
                OutputFormat::Text => Ok(format!(
                    "Removed preset {id} ({} remaining)\n",
                    remaining.len()
                )),
                OutputFormat::Json => Ok(format.to_json(&json!({
                    "removed": id,
                    "remaining": remaining.len(),
                }))),
            }
        }
    }
}

// ==================== Bot commands ====================

fn cmd_complete(
    store: Option<&JsonPresetStore>,
    params: &CompleteParams<'_>,
    format: OutputFormat,
) -> Result<String> {
    let settings = completion_settings(store, params)?;
    let client = connect()?;

    let echo = StdoutEcho::default();
    let mut session = client.completion_session();
    if format.streams() {
        session = session.with_on_chunk(echo.callback());
    }

    let rt = runtime()?;
    let answer = rt.block_on(session.send(params.text, &settings))?;

    Ok(format_answer(
        &AnswerOutput {
            kind: "completion",
            preset: params.preset,
            answer: &answer,
            streamed: echo.take(),
        },
        format,
    ))
}

fn cmd_chat(
    store: Option<&JsonPresetStore>,
    params: &ChatParams<'_>,
    format: OutputFormat,
) -> Result<String> {
    let settings = chat_settings(store, params)?;
    let client = connect()?;

    let echo = StdoutEcho::default();
    let mut session = client.chat_session();
    if format.streams() {
        session = session.with_on_chunk(echo.callback());
    }
    let rt = runtime()?;

    if let Some(message) = params.message {
        let answer = rt.block_on(session.send(message, &settings))?;
        return Ok(format_answer(
            &AnswerOutput {
                kind: "chat",
                preset: params.preset,
                answer: &answer,
                streamed: echo.take(),
            },
            format,
        ));
    }

    for line in io::stdin().lock().lines() {
        let line = line.map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to read from stdin: {e}"))
        })?;
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == RESET_COMMAND {
            session.reset();
            debug!("conversation cleared");
            continue;
        }

        match rt.block_on(session.send_optimistic(message, &settings)) {
            Ok(_) if format.streams() && echo.take() => write_chunk("\n"),
            Ok(answer) if format.streams() => write_chunk(&format!("{answer}\n")),
            Ok(_) => {}
            Err(e) => {
                if echo.take() {
                    write_chunk("\n");
                }
                let _ = writeln!(io::stderr(), "error: {e}");
            }
        }
    }

    match format {
        OutputFormat::Text => Ok(String::new()),
        OutputFormat::Json => Ok(format.to_json(session.context().messages())),
    }
}

fn cmd_defaults(kind: &str, format: OutputFormat) -> Result<String> {
    let kind = parse_kind(kind)?;
    let defaults = BuiltinDefaults;
    let settings = match kind {
        BotKind::Completion => BotSettings::Completion(defaults.completion_defaults()),
        BotKind::Chat => BotSettings::Chat(defaults.chat_defaults()),
    };

    match format {
        OutputFormat::Text => Ok(format!(
            "Built-in {kind} defaults:\n{}",
            format_settings(&settings, format)
        )),
        OutputFormat::Json => Ok(format_settings(&settings, format)),
    }
}

fn cmd_preset_create(
    store: &impl PresetStore,
    name: &str,
    kind: &str,
    prompt: Option<&str>,
    system: Option<&str>,
    sampling: &SamplingArgs,
    format: OutputFormat,
) -> Result<String> {
    let settings = match parse_kind(kind)? {
        BotKind::Completion => {
            if system.is_some() {
                return Err(CommandError::InvalidArgument(
                    "--system applies to chat presets only".to_string(),
                )
                .into());
            }
            let mut settings =
                CompletionBotSettings::new(prompt.unwrap_or(DEFAULT_COMPLETION_PROMPT));
            apply_sampling(
                sampling,
                &mut settings.model,
                &mut settings.temperature,
                &mut settings.max_tokens,
            )?;
            BotSettings::Completion(settings)
        }
        BotKind::Chat => {
            if prompt.is_some() {
                return Err(CommandError::InvalidArgument(
                    "--prompt applies to completion presets only".to_string(),
                )
                .into());
            }
            let mut settings =
                ChatBotSettings::new(system.map(system_message).into_iter().collect());
            apply_sampling(
                sampling,
                &mut settings.model,
                &mut settings.temperature,
                &mut settings.max_tokens,
            )?;
            BotSettings::Chat(settings)
        }
    };

    let preset = store.create(name, settings)?;
    match format {
        OutputFormat::Text => Ok(format!("Created preset {} ({})\n", preset.name, preset.id)),
        OutputFormat::Json => Ok(format.to_json(&preset)),
    }
}

// ==================== Settings resolution ====================

/// Resolves completion settings: preset (or a bare prompt), then flags.
fn completion_settings(
    store: Option<&impl PresetStore>,
    params: &CompleteParams<'_>,
) -> Result<CompletionBotSettings> {
    let mut settings = match (params.preset, store) {
        (Some(id), Some(store)) => match use_preset(store, id)? {
            BotSettings::Completion(settings) => settings,
            BotSettings::Chat(_) => {
                return Err(CommandError::InvalidArgument(format!(
                    "preset {id} is a chat preset; use `hexbot chat --preset {id}`"
                ))
                .into());
            }
        },
        _ => CompletionBotSettings::new(DEFAULT_COMPLETION_PROMPT),
    };

    if let Some(prompt) = params.prompt {
        settings.prompt = prompt.to_string();
    }
    apply_sampling(
        params.sampling,
        &mut settings.model,
        &mut settings.temperature,
        &mut settings.max_tokens,
    )?;
    Ok(settings)
}

/// Resolves chat settings: preset (or built-in defaults), then flags.
fn chat_settings(
    store: Option<&impl PresetStore>,
    params: &ChatParams<'_>,
) -> Result<ChatBotSettings> {
    let mut settings = match (params.preset, store) {
        (Some(id), Some(store)) => match use_preset(store, id)? {
            BotSettings::Chat(settings) => settings,
            BotSettings::Completion(_) => {
                return Err(CommandError::InvalidArgument(format!(
                    "preset {id} is a completion preset; use `hexbot complete --preset {id}`"
                ))
                .into());
            }
        },
        _ => ChatBotSettings::new(BuiltinDefaults.chat_defaults().messages),
    };

    if let Some(system) = params.system {
        settings.messages.retain(|m| m.role != Role::System);
        settings.messages.insert(0, system_message(system));
    }
    apply_sampling(
        params.sampling,
        &mut settings.model,
        &mut settings.temperature,
        &mut settings.max_tokens,
    )?;
    Ok(settings)
}

fn use_preset(store: &impl PresetStore, id: &str) -> Result<BotSettings> {
    let preset = store.mark_used(id)?;
    debug!(id = %preset.id, name = %preset.name, "using preset");
    Ok(preset.settings)
}

fn apply_sampling(
    sampling: &SamplingArgs,
    model: &mut Option<String>,
    temperature: &mut Option<f32>,
    max_tokens: &mut Option<TokenCap>,
) -> Result<()> {
    if let Some(m) = &sampling.model {
        *model = Some(m.clone());
    }
    if let Some(t) = sampling.temperature {
        if !TEMPERATURE_RANGE.contains(&t) {
            return Err(CommandError::InvalidArgument(format!(
                "temperature must be between 0.0 and 2.0, got {t}"
            ))
            .into());
        }
        *temperature = Some(t);
    }
    if sampling.unlimited {
        *max_tokens = Some(TokenCap::Unlimited);
    } else if let Some(n) = sampling.max_tokens {
        *max_tokens = Some(TokenCap::Limit(n));
    }
    Ok(())
}

// ==================== Helpers ====================

fn parse_kind(kind: &str) -> Result<BotKind> {
    BotKind::parse(kind).ok_or_else(|| {
        CommandError::InvalidArgument(format!(
            "unknown bot type '{kind}' (expected completion or chat)"
        ))
        .into()
    })
}

fn open_store(cli: &Cli) -> Result<JsonPresetStore> {
    cli.presets_path().map(JsonPresetStore::new).ok_or_else(|| {
        CommandError::ExecutionFailed(
            "Cannot determine preset file location; pass --presets".to_string(),
        )
        .into()
    })
}

fn connect() -> Result<BotClient> {
    let config = BotConfig::from_env()?;
    debug!(transport = %config.transport, base_url = %config.base_url, "connecting");
    Ok(BotClient::new(config, Arc::new(BuiltinDefaults))?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

/// Streams chunks to stdout and remembers whether any were written.
#[derive(Debug, Clone, Default)]
struct StdoutEcho {
    wrote: Arc<AtomicBool>,
}

impl StdoutEcho {
    fn callback(&self) -> impl FnMut(&str) + Send + 'static {
        let wrote = Arc::clone(&self.wrote);
        move |chunk| {
            wrote.store(true, Ordering::Relaxed);
            write_chunk(chunk);
        }
    }

    /// Returns whether anything was streamed since the last call.
    fn take(&self) -> bool {
        self.wrote.swap(false, Ordering::Relaxed)
    }
}

fn write_chunk(chunk: &str) {
    if let Err(e) = emit_chunk(&mut io::stdout().lock(), chunk) {
        debug!(error = %e, "failed to write chunk to stdout");
    }
}

fn emit_chunk(out: &mut impl Write, chunk: &str) -> io::Result<()> {
    out.write_all(chunk.as_bytes())?;
    out.flush()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::error::{Error, PresetError};
    use tempfile::TempDir;

    fn setup() -> (TempDir, JsonPresetStore) {
        let temp_dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let store = JsonPresetStore::new(temp_dir.path().join("presets.json"));
        (temp_dir, store)
    }

    fn sampling() -> SamplingArgs {
        SamplingArgs::default()
    }

    fn create(
        store: &JsonPresetStore,
        kind: &str,
        prompt: Option<&str>,
        system: Option<&str>,
    ) -> String {
        cmd_preset_create(
            store,
            "test",
            kind,
            prompt,
            system,
            &sampling(),
            OutputFormat::Text,
        )
        .unwrap_or_else(|e| panic!("create: {e}"));
        store
            .read()
            .unwrap_or_else(|e| panic!("read: {e}"))
            .pop()
            .map(|p| p.id)
            .unwrap_or_else(|| panic!("no preset created"))
    }

    #[test]
    fn test_preset_lifecycle() {
        let (_temp_dir, store) = setup();

        let listed = execute_preset(&store, &PresetCommands::List, OutputFormat::Text)
            .unwrap_or_else(|e| panic!("list: {e}"));
        assert_eq!(listed, "No presets.\n");

        let id = create(&store, "completion", Some("Summarize: {{ input }}"), None);

        let show = PresetCommands::Show { id: id.clone() };
        let shown = execute_preset(&store, &show, OutputFormat::Text)
            .unwrap_or_else(|e| panic!("show: {e}"));
        assert!(shown.contains("Summarize: {{ input }}"));

        let renamed = execute_preset(
            &store,
            &PresetCommands::Rename {
                id: id.clone(),
                name: "Summarizer".to_string(),
            },
            OutputFormat::Text,
        )
        .unwrap_or_else(|e| panic!("rename: {e}"));
        assert!(renamed.contains("Summarizer"));

        let remove = PresetCommands::Remove { id: id.clone() };
        let removed = execute_preset(&store, &remove, OutputFormat::Text)
            .unwrap_or_else(|e| panic!("remove: {e}"));
        assert!(removed.contains("0 remaining"));

        let missing = execute_preset(&store, &PresetCommands::Show { id }, OutputFormat::Text);
        assert!(matches!(
            missing,
            Err(Error::Preset(PresetError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_preset_create_rejects_mismatched_flags() {
        let (_temp_dir, store) = setup();
        let result = cmd_preset_create(
            &store,
            "x",
            "completion",
            None,
            Some("system"),
            &sampling(),
            OutputFormat::Text,
        );
        assert!(matches!(
            result,
            Err(Error::Command(CommandError::InvalidArgument(_)))
        ));

        let result = cmd_preset_create(
            &store,
            "x",
            "chat",
            Some("{{ input }}"),
            None,
            &sampling(),
            OutputFormat::Text,
        );
        assert!(result.is_err());

        let result = cmd_preset_create(
            &store,
            "x",
            "robot",
            None,
            None,
            &sampling(),
            OutputFormat::Text,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_completion_settings_from_preset_with_overrides() {
        let (_temp_dir, store) = setup();
        let id = create(&store, "completion", Some("Translate: {{ input }}"), None);

        let overrides = SamplingArgs {
            temperature: Some(0.0),
            max_tokens: Some(64),
            ..SamplingArgs::default()
        };
        let params = CompleteParams {
            text: "hello",
            prompt: None,
            preset: Some(id.as_str()),
            sampling: &overrides,
        };
        let settings =
            completion_settings(Some(&store), &params).unwrap_or_else(|e| panic!("settings: {e}"));

        assert_eq!(settings.prompt, "Translate: {{ input }}");
        assert_eq!(settings.temperature, Some(0.0));
        assert_eq!(settings.max_tokens, Some(TokenCap::Limit(64)));
    }

    #[test]
    fn test_completion_settings_rejects_chat_preset() {
        let (_temp_dir, store) = setup();
        let id = create(&store, "chat", None, Some("Be terse."));
        let args = sampling();
        let params = CompleteParams {
            text: "hello",
            prompt: None,
            preset: Some(id.as_str()),
            sampling: &args,
        };
        assert!(matches!(
            completion_settings(Some(&store), &params),
            Err(Error::Command(CommandError::InvalidArgument(_)))
        ));
    }

    #[test]
    fn test_completion_settings_without_preset() {
        let args = SamplingArgs {
            unlimited: true,
            ..SamplingArgs::default()
        };
        let params = CompleteParams {
            text: "hello",
            prompt: Some("Echo {{input}}"),
            preset: None,
            sampling: &args,
        };
        let settings = completion_settings(None::<&JsonPresetStore>, &params)
            .unwrap_or_else(|e| panic!("settings: {e}"));
        assert_eq!(settings.prompt, "Echo {{input}}");
        assert_eq!(settings.max_tokens, Some(TokenCap::Unlimited));
        assert_eq!(settings.model, None);
    }

    #[test]
    fn test_chat_settings_system_override() {
        let args = sampling();
        let params = ChatParams {
            message: Some("hi"),
            preset: None,
            system: Some("You are a pirate."),
            sampling: &args,
        };
        let settings = chat_settings(None::<&JsonPresetStore>, &params)
            .unwrap_or_else(|e| panic!("settings: {e}"));

        let systems: Vec<_> = settings
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .collect();
        assert_eq!(systems.len(), 1);
        assert_eq!(settings.messages[0].content, "You are a pirate.");
    }

    #[test]
    fn test_chat_settings_marks_preset_used() {
        let (_temp_dir, store) = setup();
        let id = create(&store, "chat", None, Some("Be terse."));
        let before = store.get(&id).unwrap_or_else(|e| panic!("get: {e}"));

        let args = sampling();
        let params = ChatParams {
            message: Some("hi"),
            preset: Some(id.as_str()),
            system: None,
            sampling: &args,
        };
        let settings =
            chat_settings(Some(&store), &params).unwrap_or_else(|e| panic!("settings: {e}"));
        assert_eq!(settings.messages[0].content, "Be terse.");

        let after = store.get(&id).unwrap_or_else(|e| panic!("get: {e}"));
        assert!(after.last_used_at >= before.last_used_at);
    }

    #[test]
    fn test_temperature_out_of_range() {
        let args = SamplingArgs {
            temperature: Some(2.5),
            ..SamplingArgs::default()
        };
        let params = CompleteParams {
            text: "x",
            prompt: None,
            preset: None,
            sampling: &args,
        };
        assert!(completion_settings(None::<&JsonPresetStore>, &params).is_err());
    }

    #[test]
    fn test_cmd_defaults() {
        let text = cmd_defaults("completion", OutputFormat::Text)
            .unwrap_or_else(|e| panic!("defaults: {e}"));
        assert!(text.contains("text-davinci-003"));

        let json = cmd_defaults("chat", OutputFormat::Json)
            .unwrap_or_else(|e| panic!("defaults: {e}"));
        assert!(json.contains("\"type\": \"chat\""));

        assert!(cmd_defaults("other", OutputFormat::Text).is_err());
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_emit_chunk_writes_and_reports_errors() {
        let mut out = Vec::new();
        emit_chunk(&mut out, "Bon").unwrap_or_else(|e| panic!("write: {e}"));
        emit_chunk(&mut out, "jour").unwrap_or_else(|e| panic!("write: {e}"));
        assert_eq!(out, b"Bonjour");

        let err = emit_chunk(&mut BrokenPipe, "lost").err();
        assert_eq!(err.map(|e| e.kind()), Some(io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn test_stdout_echo_take_resets() {
        let echo = StdoutEcho::default();
        assert!(!echo.take());
        echo.wrote.store(true, Ordering::Relaxed);
        assert!(echo.take());
        assert!(!echo.take());
    }
}
