//! Command-line collaborators - call external programs as subprocesses

use crate::collaborators::{
    CollaboratorError, CommandClientConfig, CompletionClient, CompletionParams, Transcriber,
    Transcript, TranscriptionOptions,
};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Audio extensions the transcription backend accepts
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] = &[
    "flac", "m4a", "mp3", "mp4", "mpeg", "mpga", "oga", "ogg", "wav", "webm",
];

/// Environment variable carrying step params as JSON
pub const PARAMS_ENV: &str = "PODCAST_PIPELINE_PARAMS";

/// Run a prepared command, optionally feeding stdin, under a timeout
async fn run_command(
    mut command: Command,
    program: &str,
    stdin: Option<&str>,
    timeout_secs: u64,
) -> Result<String, CollaboratorError> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        CollaboratorError::Internal(format!("Failed to execute {}: {}", program, e))
    })?;

    // Feed stdin while stdout drains so neither pipe can fill and block
    let pipe = child.stdin.take();
    let feed = async move {
        match (stdin, pipe) {
            (Some(input), Some(mut pipe)) => {
                let written = pipe.write_all(input.as_bytes()).await;
                // Dropping the handle closes stdin so the program sees EOF
                drop(pipe);
                written
            }
            _ => Ok(()),
        }
    };

    let (written, output) = timeout(Duration::from_secs(timeout_secs), async {
        tokio::join!(feed, child.wait_with_output())
    })
    .await
    .map_err(|_| CollaboratorError::Timeout(timeout_secs))?;

    let output: Output =
        output.map_err(|e| CollaboratorError::Unavailable(format!("{} failed: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        warn!("{} exited with code {}: {}", program, exit_code, stderr.trim());
        return Err(CollaboratorError::Unavailable(format!(
            "{} exited with code {}: {}",
            program,
            exit_code,
            stderr.trim()
        )));
    }

    // A program may exit successfully without reading all of its input
    if let Err(e) = written {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(CollaboratorError::Unavailable(format!(
                "Failed to write to {}: {}",
                program, e
            )));
        }
    }

    let content = String::from_utf8(output.stdout).map_err(|e| {
        CollaboratorError::Internal(format!("Failed to decode {} output: {}", program, e))
    })?;

    debug!("{} returned {} bytes of output", program, content.len());
    Ok(content)
}

/// Completion backend that pipes the prompt into a command and reads stdout
///
/// Timeouts and non-zero exits are reported as transient; a program that
/// cannot be spawned at all is a permanent error.
#[derive(Debug, Clone)]
pub struct CommandCompletionClient {
    config: CommandClientConfig,
}

impl CommandCompletionClient {
    pub fn new(config: CommandClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandClientConfig {
        &self.config
    }

    fn build_command(&self, model: Option<&str>, params: &CompletionParams) -> Command {
        let mut command = Command::new(&self.config.program);
        command.args(&self.config.args);

        let model = model.or(self.config.default_model.as_deref());
        if let (Some(flag), Some(model)) = (&self.config.model_flag, model) {
            command.arg(flag).arg(model);
        }

        if !params.is_empty() {
            if let Ok(json) = serde_json::to_string(params) {
                command.env(PARAMS_ENV, json);
            }
        }
        command
    }
}

#[async_trait]
impl CompletionClient for CommandCompletionClient {
    async fn complete(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &CompletionParams,
    ) -> Result<String, CollaboratorError> {
        debug!(
            "Spawning {} with prompt length: {}",
            self.config.program,
            prompt.len()
        );
        let command = self.build_command(model, params);
        run_command(
            command,
            &self.config.program,
            Some(prompt),
            self.config.timeout_secs,
        )
        .await
    }
}

/// Transcription backend that runs a command with the audio path as last argument
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    config: CommandClientConfig,
}

impl CommandTranscriber {
    pub fn new(config: CommandClientConfig) -> Self {
        Self { config }
    }

    fn check_format(audio: &Path) -> Result<(), CollaboratorError> {
        let extension = audio
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if SUPPORTED_AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            Ok(())
        } else {
            Err(CollaboratorError::UnsupportedFormat(format!(
                "{} (expected one of {})",
                audio.display(),
                SUPPORTED_AUDIO_EXTENSIONS.join(", ")
            )))
        }
    }
}

impl CommandTranscriber {
    /// Read either plain text or a JSON object with `text` and `segments`
    fn parse_output(output: &str) -> Transcript {
        let trimmed = output.trim();
        if let Ok(serde_json::Value::Object(mut fields)) = serde_json::from_str(trimmed) {
            if let Some(serde_json::Value::String(text)) = fields.remove("text") {
                return Transcript {
                    text: text.trim().to_string(),
                    segments: fields.remove("segments").filter(|s| !s.is_null()),
                };
            }
        }
        Transcript {
            text: trimmed.to_string(),
            segments: None,
        }
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscriptionOptions,
    ) -> Result<Transcript, CollaboratorError> {
        Self::check_format(audio)?;

        let mut command = Command::new(&self.config.program);
        command.args(&self.config.args);

        let model = options.model.as_deref().or(self.config.default_model.as_deref());
        if let (Some(flag), Some(model)) = (&self.config.model_flag, model) {
            command.arg(flag).arg(model);
        }
        if let Some(language) = &options.language {
            command.env("PODCAST_PIPELINE_LANGUAGE", language);
        }
        if let Some(prompt) = &options.prompt {
            command.env("PODCAST_PIPELINE_VOCABULARY", prompt);
        }
        command.arg(audio);

        debug!("Transcribing {} with {}", audio.display(), self.config.program);
        let text = run_command(command, &self.config.program, None, self.config.timeout_secs)
            .await?;

        Ok(Self::parse_output(&text))
    }
}
