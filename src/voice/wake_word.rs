//! Wake word detection
//!
//! A background listener records short clips, transcribes them and posts a wake
//! signal whenever the transcript contains a wake phrase. Clips without voice energy
//! are skipped before they reach the transcriber.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{AudioIo, Transcriber};
use crate::signal::Notifier;
use crate::{Error, Result};

/// Matches wake phrases in transcripts
#[derive(Debug, Clone)]
pub struct WakeWordDetector {
    wake_words: Vec<String>,
}

impl WakeWordDetector {
    /// Create a new wake word detector
    ///
    /// # Arguments
    ///
    /// * `wake_words` - Phrases to detect (e.g., "alex")
    ///
    /// # Errors
    ///
    /// Returns error if no non-blank phrase is given
    pub fn new(wake_words: Vec<String>) -> Result<Self> {
        let normalized: Vec<String> = wake_words
            .into_iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        if normalized.is_empty() {
            return Err(Error::Config("wake word must not be empty".to_string()));
        }

        tracing::debug!(wake_words = ?normalized, "wake word detector initialized");
        Ok(Self {
            wake_words: normalized,
        })
    }

    /// Whether `transcript` contains a wake phrase (case-insensitive substring)
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        let normalized = transcript.to_lowercase();
        self.wake_words.iter().any(|w| normalized.contains(w.as_str()))
    }

    /// Get the configured wake words
    #[must_use]
    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }
}

/// Cadence of the wake-word listener
#[derive(Debug, Clone, Copy)]
pub struct WakeSettings {
    /// Length of each recorded clip
    pub clip: Duration,

    /// Pause between cycles
    pub idle: Duration,
}

impl Default for WakeSettings {
    fn default() -> Self {
        Self {
            clip: Duration::from_secs(3),
            idle: Duration::from_millis(100),
        }
    }
}

/// Continuously listens for the wake phrase
pub struct WakeWordListener {
    audio: Arc<dyn AudioIo>,
    transcriber: Arc<dyn Transcriber>,
    detector: WakeWordDetector,
    settings: WakeSettings,
}

impl WakeWordListener {
    #[must_use]
    pub fn new(
        audio: Arc<dyn AudioIo>,
        transcriber: Arc<dyn Transcriber>,
        detector: WakeWordDetector,
        settings: WakeSettings,
    ) -> Self {
        Self {
            audio,
            transcriber,
            detector,
            settings,
        }
    }

    /// Run one record/transcribe/match cycle
    ///
    /// Returns true when the wake phrase was heard. Failures count as no detection.
    pub async fn listen_once(&self) -> bool {
        let clip = match self.audio.record_clip(self.settings.clip).await {
            Ok(clip) => clip,
            Err(e) => {
                tracing::debug!(error = %e, "wake clip capture failed");
                return false;
            }
        };

        if !clip.voiced {
            tracing::trace!("wake clip silent, skipping transcription");
            return false;
        }

        match self.transcriber.transcribe(&clip.wav).await {
            Ok(transcript) => {
                let heard = self.detector.matches(&transcript);
                if heard {
                    tracing::info!(transcript = %transcript, "wake word detected");
                } else {
                    tracing::trace!(transcript = %transcript, "no wake word");
                }
                heard
            }
            Err(e) => {
                tracing::debug!(error = %e, "wake clip transcription failed");
                false
            }
        }
    }

    /// Listen until `cancel` fires, posting to `wake` on every detection
    ///
    /// A detection while a wake signal is still pending is dropped.
    pub async fn run(self, wake: Notifier, cancel: CancellationToken) {
        tracing::info!(wake_words = ?self.detector.wake_words(), "listening for wake word");

        loop {
            let heard = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                heard = self.listen_once() => heard,
            };

            if heard && !wake.notify() {
                tracing::debug!("wake signal already pending, dropping detection");
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.idle) => {}
            }
        }

        tracing::debug!("wake word listener stopped");
    }
}
