//! Voice activity detection
//!
//! Energy-based classification used for three things: ending an utterance capture on
//! trailing silence, gating wake-word clips, and the barge-in monitor that interrupts
//! playback when the user talks over the assistant.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::AudioIo;
use super::capture::SAMPLE_RATE;
use crate::signal::Notifier;

/// Default RMS level above which a frame counts as voiced
pub const VOICE_THRESHOLD: f32 = 0.03;

/// Default RMS level below which capture audio counts as silence (about -35 dBFS)
pub const SILENCE_THRESHOLD: f32 = 0.018;

/// Frame length used for classification (20ms at 16kHz)
const FRAME_SAMPLES: usize = SAMPLE_RATE as usize / 50;

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Number of samples covering `duration` at the capture rate
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn samples_for(duration: Duration) -> usize {
    (duration.as_millis() * u128::from(SAMPLE_RATE) / 1000) as usize
}

/// Classifies a window of audio as containing sustained voice or not
#[derive(Debug, Clone, Copy)]
pub struct VoiceActivityDetector {
    threshold: f32,
    min_voiced_frames: usize,
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new(VOICE_THRESHOLD, 5)
    }
}

impl VoiceActivityDetector {
    /// Create a detector requiring `min_voiced_frames` consecutive 20ms frames above
    /// `threshold`
    #[must_use]
    pub fn new(threshold: f32, min_voiced_frames: usize) -> Self {
        Self {
            threshold,
            min_voiced_frames: min_voiced_frames.max(1),
        }
    }

    /// Whether `samples` contain sustained voice energy
    #[must_use]
    pub fn classify(&self, samples: &[f32]) -> bool {
        let mut run = 0;
        for frame in samples.chunks(FRAME_SAMPLES) {
            if rms(frame) > self.threshold {
                run += 1;
                if run >= self.min_voiced_frames {
                    return true;
                }
            } else {
                run = 0;
            }
        }
        false
    }
}

/// Tracks trailing silence while an utterance is being captured
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    threshold: f32,
    timeout_samples: usize,
    trailing_silence: usize,
    heard_voice: bool,
}

impl SilenceDetector {
    /// Stop once `timeout` of continuous audio stays below `threshold`
    #[must_use]
    pub fn new(threshold: f32, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout_samples: samples_for(timeout),
            trailing_silence: 0,
            heard_voice: false,
        }
    }

    /// Feed a chunk; returns true once the trailing silence reaches the timeout
    ///
    /// Silence at the very start counts too, so a user who never speaks ends the
    /// capture after one timeout.
    pub fn push(&mut self, chunk: &[f32]) -> bool {
        if rms(chunk) > self.threshold {
            self.heard_voice = true;
            self.trailing_silence = 0;
        } else {
            self.trailing_silence += chunk.len();
        }

        self.trailing_silence >= self.timeout_samples
    }

    /// Whether any chunk so far carried voice energy
    #[must_use]
    pub const fn heard_voice(&self) -> bool {
        self.heard_voice
    }
}

/// Cadence of the barge-in monitor
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    /// Length of each listen-and-classify cycle
    pub window: Duration,

    /// Pause between cycles
    pub idle: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(300),
            idle: Duration::ZERO,
        }
    }
}

/// Watch the microphone during playback and post an interrupt on sustained voice
///
/// Returns true if an interrupt was posted. Stops without posting once `cancel`
/// fires. Classification failures count as "no voice" for that cycle.
pub async fn monitor_voice_activity(
    audio: Arc<dyn AudioIo>,
    settings: MonitorSettings,
    interrupt: Notifier,
    cancel: CancellationToken,
) -> bool {
    loop {
        let heard = tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            heard = audio.listen_short(settings.window) => heard,
        };

        match heard {
            Ok(true) => {
                tracing::info!("voice detected during playback, interrupting");
                interrupt.notify();
                return true;
            }
            Ok(false) => {}
            Err(e) => tracing::debug!(error = %e, "voice activity check failed"),
        }

        if !settings.idle.is_zero() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(settings.idle) => {}
            }
        }
    }
}
