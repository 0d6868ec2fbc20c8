//! Speech-to-text (STT) processing

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{Error, Result};

/// Turns recorded speech into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stt`] on network, format or empty-result failure
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes speech with the `OpenAI` Whisper API
pub struct WhisperApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: String,
}

impl WhisperApi {
    /// Create a new Whisper API client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            language: "en".to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperApi {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                Error::Stt(e.to_string())
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            Error::Stt(e.to_string())
        })?;

        non_empty(result.text)
    }
}

/// Transcribes speech with a local `whisper-cli` binary
///
/// Used for wake-word clips, where latency and cost matter more than accuracy.
pub struct LocalWhisper {
    binary: PathBuf,
    model: PathBuf,
    temp_dir: Option<PathBuf>,
}

impl LocalWhisper {
    /// Create a transcriber running `binary` with the ggml `model`
    #[must_use]
    pub const fn new(binary: PathBuf, model: PathBuf) -> Self {
        Self {
            binary,
            model,
            temp_dir: None,
        }
    }

    /// Write clips under `dir` instead of the system temp directory
    #[must_use]
    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = Some(dir);
        self
    }
}

/// Write `wav` to a closed temp file that is removed when the path is dropped
fn write_clip(dir: Option<&Path>, wav: &[u8]) -> std::io::Result<tempfile::TempPath> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("parley-clip").suffix(".wav");
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(wav)?;
    file.flush()?;
    Ok(file.into_temp_path())
}

#[async_trait]
impl Transcriber for LocalWhisper {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let dir = self.temp_dir.clone();
        let wav = wav.to_vec();
        let clip = tokio::task::spawn_blocking(move || write_clip(dir.as_deref(), &wav))
            .await
            .map_err(|e| Error::Stt(format!("clip writer failed: {e}")))?
            .map_err(|e| Error::Stt(format!("failed to write clip: {e}")))?;

        let output = tokio::process::Command::new(&self.binary)
            .arg("-m")
            .arg(&self.model)
            .args(["-nt", "-np", "-f"])
            .arg(clip.as_os_str())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Stt(format!("failed to run {}: {e}", self.binary.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Stt(format!(
                "whisper-cli exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        tracing::trace!(transcript = %text.trim(), "local transcription");
        non_empty(text.into_owned())
    }
}

fn non_empty(text: String) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Stt("empty transcript".to_string()));
    }

    tracing::info!(transcript = %trimmed, "transcription complete");
    Ok(trimmed.to_string())
}
