//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfigFile {
    /// Assistant identity and wording
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// `OpenAI` endpoint, credentials and models
    #[serde(default)]
    pub openai: OpenAiFileConfig,

    /// History and memory caps
    #[serde(default)]
    pub limits: LimitsFileConfig,

    /// Capture, wake and barge-in tuning
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Memory store location
    #[serde(default)]
    pub memory: MemoryFileConfig,

    /// Local `whisper-cli` used for wake clips
    #[serde(default)]
    pub whisper: WhisperFileConfig,

    /// Milliseconds sessions get to exit at shutdown
    pub shutdown_grace_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantFileConfig {
    /// Wake phrase (e.g. "alex")
    pub wake_word: Option<String>,

    /// Spoken when a session starts
    pub greeting: Option<String>,

    /// Replaces the default instruction message
    pub instructions: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiFileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub chat_model: Option<String>,
    pub stt_model: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_instructions: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsFileConfig {
    /// Turns kept in conversation history
    pub history: Option<usize>,

    /// Facts kept in the memory store
    pub memory: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioFileConfig {
    pub max_capture_secs: Option<f64>,
    pub silence_timeout_secs: Option<f64>,
    pub silence_threshold: Option<f32>,
    pub wake_clip_secs: Option<f64>,
    pub wake_idle_ms: Option<u64>,
    pub monitor_window_ms: Option<u64>,
    pub voice_threshold: Option<f32>,
    pub voice_frames: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryFileConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhisperFileConfig {
    /// Path to the `whisper-cli` binary
    pub binary: Option<PathBuf>,

    /// Path to the ggml model file
    pub model: Option<PathBuf>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ParleyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ParleyConfigFile {
    config_file_path().map_or_else(ParleyConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> ParleyConfigFile {
    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ParleyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ParleyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}
