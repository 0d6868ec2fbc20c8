//! Configuration management for parley
//!
//! Values resolve with precedence CLI override > environment > config file > defaults.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::conversation::{DEFAULT_GREETING, default_instructions};
use crate::voice::{SILENCE_THRESHOLD, VOICE_THRESHOLD};
use crate::{Error, Result};

pub use file::{ParleyConfigFile, config_file_path, load_config_file, load_config_file_from};

/// Default `OpenAI` API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default wake phrase
pub const DEFAULT_WAKE_WORD: &str = "alex";

/// Default speaking-style instructions for synthesized replies
pub const DEFAULT_TTS_INSTRUCTIONS: &str = "Speak in a friendly, expressive, and natural tone. \
     Use natural pauses and intonation. Sound like a real person having a conversation.";

/// Parley configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// `OpenAI` API key (from `OPENAI_API_KEY`)
    pub api_key: String,

    /// `OpenAI` API base URL
    pub api_base_url: String,

    /// Assistant identity and wording
    pub assistant: AssistantConfig,

    /// Remote models
    pub models: ModelConfig,

    /// History and memory caps
    pub limits: Limits,

    /// Memory store file
    pub memory_path: PathBuf,

    /// Capture, wake and barge-in tuning
    pub audio: AudioConfig,

    /// Local transcriber for wake clips, if configured
    pub local_whisper: Option<LocalWhisperConfig>,

    /// Time sessions get to exit at shutdown
    pub shutdown_grace: Duration,

    /// Path to data directory
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Wake phrase, matched case-insensitively as a substring
    pub wake_word: String,

    /// Spoken when a session starts
    pub greeting: String,

    /// Static instruction message sent with every request
    pub instructions: String,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Chat completion model
    pub chat: String,

    /// Transcription model
    pub stt: String,

    /// Speech synthesis model
    pub tts: String,

    /// Speech synthesis voice
    pub tts_voice: String,

    /// Speaking-style instructions
    pub tts_instructions: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Turns kept in conversation history
    pub history: usize,

    /// Facts kept in the memory store
    pub memory: usize,
}

/// Audio tuning
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    pub max_capture: Duration,
    pub silence_timeout: Duration,
    pub silence_threshold: f32,
    pub wake_clip: Duration,
    pub wake_idle: Duration,
    pub monitor_window: Duration,
    pub voice_threshold: f32,
    pub voice_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_capture: Duration::from_secs(30),
            silence_timeout: Duration::from_secs(3),
            silence_threshold: SILENCE_THRESHOLD,
            wake_clip: Duration::from_secs(3),
            wake_idle: Duration::from_millis(100),
            monitor_window: Duration::from_millis(300),
            voice_threshold: VOICE_THRESHOLD,
            voice_frames: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalWhisperConfig {
    pub binary: PathBuf,
    pub model: PathBuf,
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key is missing or a value is invalid
    pub fn load(wake_word_override: Option<String>) -> Result<Self> {
        let file = load_config_file();
        let data_dir = directories::BaseDirs::new()
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("parley"));

        Self::resolve(
            file,
            |key| std::env::var(key).ok(),
            wake_word_override,
            data_dir,
        )
    }

    /// Resolve configuration from explicit sources
    ///
    /// `env` looks up environment variables; blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key is missing or a value is invalid
    pub fn resolve(
        file: ParleyConfigFile,
        env: impl Fn(&str) -> Option<String>,
        wake_word_override: Option<String>,
        data_dir: PathBuf,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let api_key = env("OPENAI_API_KEY")
            .or(file.openai.api_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))?;

        let api_base_url = env("OPENAI_BASE_URL")
            .or(file.openai.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let wake_word = wake_word_override
            .filter(|w| !w.trim().is_empty())
            .or_else(|| env("PARLEY_WAKE_WORD"))
            .or(file.assistant.wake_word)
            .unwrap_or_else(|| DEFAULT_WAKE_WORD.to_string())
            .trim()
            .to_string();
        if wake_word.is_empty() {
            return Err(Error::Config("wake word must not be empty".to_string()));
        }

        let assistant = AssistantConfig {
            greeting: file
                .assistant
                .greeting
                .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            instructions: file
                .assistant
                .instructions
                .unwrap_or_else(|| default_instructions(&wake_word)),
            wake_word,
        };

        let models = ModelConfig {
            chat: env("PARLEY_CHAT_MODEL")
                .or(file.openai.chat_model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            stt: env("PARLEY_STT_MODEL")
                .or(file.openai.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts: env("PARLEY_TTS_MODEL")
                .or(file.openai.tts_model)
                .unwrap_or_else(|| "gpt-4o-mini-tts".to_string()),
            tts_voice: env("PARLEY_TTS_VOICE")
                .or(file.openai.tts_voice)
                .unwrap_or_else(|| "onyx".to_string()),
            tts_instructions: file
                .openai
                .tts_instructions
                .unwrap_or_else(|| DEFAULT_TTS_INSTRUCTIONS.to_string()),
        };

        let limits = Limits {
            history: positive("limits.history", file.limits.history.unwrap_or(20))?,
            memory: positive("limits.memory", file.limits.memory.unwrap_or(50))?,
        };

        let defaults = AudioConfig::default();
        let a = file.audio;
        let audio = AudioConfig {
            max_capture: secs("audio.max_capture_secs", a.max_capture_secs)?
                .unwrap_or(defaults.max_capture),
            silence_timeout: secs("audio.silence_timeout_secs", a.silence_timeout_secs)?
                .unwrap_or(defaults.silence_timeout),
            silence_threshold: a.silence_threshold.unwrap_or(defaults.silence_threshold),
            wake_clip: secs("audio.wake_clip_secs", a.wake_clip_secs)?
                .unwrap_or(defaults.wake_clip),
            wake_idle: a
                .wake_idle_ms
                .map_or(defaults.wake_idle, Duration::from_millis),
            monitor_window: a
                .monitor_window_ms
                .map_or(defaults.monitor_window, Duration::from_millis),
            voice_threshold: a.voice_threshold.unwrap_or(defaults.voice_threshold),
            voice_frames: positive(
                "audio.voice_frames",
                a.voice_frames.unwrap_or(defaults.voice_frames),
            )?,
        };
        if audio.monitor_window.is_zero() {
            return Err(Error::Config("audio.monitor_window_ms must be > 0".to_string()));
        }

        let memory_path = env("PARLEY_MEMORY_FILE")
            .map(PathBuf::from)
            .or(file.memory.path)
            .unwrap_or_else(|| data_dir.join("memory.txt"));

        let binary = env("PARLEY_WHISPER_CLI")
            .map(PathBuf::from)
            .or(file.whisper.binary);
        let model = env("PARLEY_WHISPER_MODEL")
            .map(PathBuf::from)
            .or(file.whisper.model);
        let local_whisper = match (binary, model) {
            (Some(binary), Some(model)) => Some(LocalWhisperConfig { binary, model }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "local whisper needs both a binary and a model".to_string(),
                ));
            }
        };

        Ok(Self {
            api_key,
            api_base_url,
            assistant,
            models,
            limits,
            memory_path,
            audio,
            local_whisper,
            shutdown_grace: file
                .shutdown_grace_ms
                .map_or(crate::orchestrator::DEFAULT_SHUTDOWN_GRACE, Duration::from_millis),
            data_dir,
        })
    }
}

fn positive(name: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(Error::Config(format!("{name} must be at least 1")));
    }
    Ok(value)
}

fn secs(name: &str, value: Option<f64>) -> Result<Option<Duration>> {
    value
        .map(|v| {
            Duration::try_from_secs_f64(v)
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| Error::Config(format!("{name} must be a positive number")))
        })
        .transpose()
}
