//! Audio I/O seam
//!
//! [`AudioIo`] is everything the conversation core needs from the sound hardware.
//! [`SystemAudio`] implements it on top of the shared [`Microphone`] and the
//! [`Speaker`]; tests substitute scripted fakes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::activity::{SilenceDetector, VoiceActivityDetector, samples_for};
use super::capture::{Microphone, SAMPLE_RATE, SampleChunk, samples_to_wav};
use super::cue::Cue;
use super::playback::{Speaker, decode_mp3};
use crate::signal::Listener;
use crate::{Error, Result};

/// Slack added to capture deadlines before a silent device counts as broken
const DEVICE_GRACE: Duration = Duration::from_secs(1);

/// Bounds for an adaptive utterance capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    /// Hard cap on recording length
    pub max_duration: Duration,

    /// Trailing silence that ends the recording early
    pub silence_timeout: Duration,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(30),
            silence_timeout: Duration::from_secs(3),
        }
    }
}

/// A finished recording
#[derive(Debug, Clone)]
pub struct Recording {
    /// 16kHz mono WAV bytes
    pub wav: Vec<u8>,

    /// Length of the recorded audio
    pub duration: Duration,

    /// Whether any voice energy was heard
    pub voiced: bool,
}

impl Recording {
    #[allow(clippy::cast_precision_loss)]
    fn from_samples(samples: &[f32], voiced: bool) -> Result<Self> {
        Ok(Self {
            wav: samples_to_wav(samples, SAMPLE_RATE)?,
            duration: Duration::from_secs_f64(samples.len() as f64 / f64::from(SAMPLE_RATE)),
            voiced,
        })
    }
}

/// How a playback call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every sample was played
    Completed,
    /// Stopped early by an interrupt signal
    Interrupted,
}

/// Sound hardware as seen by the conversation core
#[async_trait]
pub trait AudioIo: Send + Sync {
    /// Record an utterance, stopping on trailing silence or at the max duration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if the microphone stops delivering audio
    async fn capture(&self, limits: CaptureLimits) -> Result<Recording>;

    /// Record a fixed-length clip
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if the microphone stops delivering audio
    async fn record_clip(&self, duration: Duration) -> Result<Recording>;

    /// Listen for `window` and report whether sustained voice was heard
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if the microphone stops delivering audio
    async fn listen_short(&self, window: Duration) -> Result<bool>;

    /// Play synthesized audio until it finishes, `interrupt` fires, or `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when `cancel` fires first, or an audio error if
    /// the clip cannot be decoded or played
    async fn play(
        &self,
        audio: &[u8],
        interrupt: &mut Listener,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome>;

    /// Play a status cue to completion
    ///
    /// # Errors
    ///
    /// Returns error if the output device fails
    async fn play_cue(&self, cue: Cue) -> Result<()>;
}

/// [`AudioIo`] backed by the default input and output devices
pub struct SystemAudio {
    mic: Microphone,
    speaker: Speaker,
    silence_threshold: f32,
    vad: VoiceActivityDetector,
}

impl SystemAudio {
    /// Open both devices
    ///
    /// # Errors
    ///
    /// Returns error if either device cannot be opened
    pub fn open(silence_threshold: f32, vad: VoiceActivityDetector) -> Result<Self> {
        Ok(Self {
            mic: Microphone::open()?,
            speaker: Speaker::new()?,
            silence_threshold,
            vad,
        })
    }

    async fn collect(&self, duration: Duration) -> Result<Vec<f32>> {
        let wanted = samples_for(duration);
        let mut rx = self.mic.subscribe();
        let mut samples = Vec::with_capacity(wanted);

        tokio::time::timeout(duration + DEVICE_GRACE, async {
            while samples.len() < wanted {
                samples.extend_from_slice(&next_chunk(&mut rx).await?);
            }
            Ok::<_, Error>(())
        })
        .await
        .map_err(|_| Error::Capture("microphone delivered no audio".to_string()))??;

        samples.truncate(wanted);
        Ok(samples)
    }

    async fn play_samples(
        &self,
        samples: Vec<f32>,
        interrupt: Option<&mut Listener>,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        let stop = Arc::new(AtomicBool::new(false));
        let speaker = self.speaker.clone();
        let flag = Arc::clone(&stop);
        let mut playing =
            tokio::task::spawn_blocking(move || speaker.play_blocking(samples, &flag));

        let interrupted = async {
            match interrupt {
                Some(listener) => listener.fired().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stop.store(true, Ordering::Relaxed);
                let _ = playing.await;
                Err(Error::Cancelled)
            }
            () = interrupted => {
                stop.store(true, Ordering::Relaxed);
                let _ = playing.await;
                tracing::debug!("playback interrupted");
                Ok(PlaybackOutcome::Interrupted)
            }
            joined = &mut playing => {
                let completed = joined.map_err(|e| Error::Audio(format!("playback task failed: {e}")))??;
                Ok(if completed { PlaybackOutcome::Completed } else { PlaybackOutcome::Interrupted })
            }
        }
    }
}

#[async_trait]
impl AudioIo for SystemAudio {
    async fn capture(&self, limits: CaptureLimits) -> Result<Recording> {
        let max = samples_for(limits.max_duration);
        let mut detector = SilenceDetector::new(self.silence_threshold, limits.silence_timeout);
        let mut rx = self.mic.subscribe();
        let mut samples = Vec::new();

        tracing::debug!(
            max_secs = limits.max_duration.as_secs_f32(),
            silence_secs = limits.silence_timeout.as_secs_f32(),
            "capturing utterance"
        );

        tokio::time::timeout(limits.max_duration + DEVICE_GRACE, async {
            while samples.len() < max {
                let chunk = next_chunk(&mut rx).await?;
                samples.extend_from_slice(&chunk);
                if detector.push(&chunk) {
                    break;
                }
            }
            Ok::<_, Error>(())
        })
        .await
        .map_err(|_| Error::Capture("microphone delivered no audio".to_string()))??;

        samples.truncate(max);
        let recording = Recording::from_samples(&samples, detector.heard_voice())?;
        tracing::debug!(
            secs = recording.duration.as_secs_f32(),
            voiced = recording.voiced,
            "utterance captured"
        );
        Ok(recording)
    }

    async fn record_clip(&self, duration: Duration) -> Result<Recording> {
        let samples = self.collect(duration).await?;
        Recording::from_samples(&samples, self.vad.classify(&samples))
    }

    async fn listen_short(&self, window: Duration) -> Result<bool> {
        let samples = self.collect(window).await?;
        Ok(self.vad.classify(&samples))
    }

    async fn play(
        &self,
        audio: &[u8],
        interrupt: &mut Listener,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        let samples = decode_mp3(audio)?;
        self.play_samples(samples, Some(interrupt), cancel).await
    }

    async fn play_cue(&self, cue: Cue) -> Result<()> {
        self.play_samples(cue.samples(), None, &CancellationToken::new())
            .await
            .map(|_| ())
    }
}

async fn next_chunk(rx: &mut broadcast::Receiver<SampleChunk>) -> Result<SampleChunk> {
    loop {
        match rx.recv().await {
            Ok(chunk) => return Ok(chunk),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::trace!(skipped, "audio consumer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(Error::Capture("microphone stream closed".to_string()));
            }
        }
    }
}
