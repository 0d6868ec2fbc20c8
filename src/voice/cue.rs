//! Notification cues
//!
//! Short generated tone patterns played at startup, after an utterance has been
//! captured, and when a session aborts.

use super::playback::PLAYBACK_SAMPLE_RATE;

/// Amplitude for every cue (30% volume)
const AMPLITUDE: f32 = 0.3;

/// Fade length at both ends of a tone, avoids clicks
const FADE_MS: u32 = 8;

/// An audible status cue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// The assistant is up and listening for the wake word
    Startup,
    /// An utterance was captured and is being processed
    Notification,
    /// The session aborted
    Error,
}

impl Cue {
    /// Tone pattern as `(frequency Hz, duration ms)` pairs; a frequency of 0 is a gap
    const fn pattern(self) -> &'static [(f32, u32)] {
        match self {
            Self::Startup => &[(523.25, 90), (659.25, 90), (783.99, 160)],
            Self::Notification => &[(880.0, 120)],
            Self::Error => &[(220.0, 160), (0.0, 60), (196.0, 220)],
        }
    }

    /// Render the cue at the playback sample rate
    #[must_use]
    pub fn samples(self) -> Vec<f32> {
        self.pattern()
            .iter()
            .flat_map(|&(frequency, ms)| tone(frequency, ms))
            .collect()
    }
}

#[allow(clippy::cast_precision_loss)]
fn tone(frequency: f32, ms: u32) -> Vec<f32> {
    let rate = PLAYBACK_SAMPLE_RATE as f32;
    let count = (PLAYBACK_SAMPLE_RATE / 1000 * ms) as usize;
    let fade = (PLAYBACK_SAMPLE_RATE / 1000 * FADE_MS) as usize;

    if frequency <= 0.0 {
        return vec![0.0; count];
    }

    (0..count)
        .map(|i| {
            let t = i as f32 / rate;
            let edge = i.min(count - 1 - i);
            let envelope = if edge < fade {
                edge as f32 / fade as f32
            } else {
                1.0
            };
            (2.0 * std::f32::consts::PI * frequency * t).sin() * AMPLITUDE * envelope
        })
        .collect()
}
