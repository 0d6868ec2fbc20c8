//! Error types for parley

use thiserror::Error;

/// Result type alias for parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in parley
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Utterance capture error
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Chat completion request failed or returned a non-2xx status
    #[error("reply error: {0}")]
    Reply(String),

    /// Chat completion returned content that does not match the reply schema
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Memory store read/write error
    #[error("memory error: {0}")]
    Memory(String),

    /// Invalid conversation turn
    #[error("conversation error: {0}")]
    Conversation(String),

    /// Operation observed cancellation before completing
    #[error("cancelled")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error only reports an observed cancellation
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
