//! Voice processing module
//!
//! Handles audio capture and playback, voice activity detection, wake word
//! listening, status cues, and the speech-to-text / text-to-speech clients.

mod activity;
mod capture;
mod cue;
mod device;
mod playback;
mod stt;
mod tts;
mod wake_word;

pub use activity::{
    MonitorSettings, SILENCE_THRESHOLD, SilenceDetector, VOICE_THRESHOLD, VoiceActivityDetector,
    monitor_voice_activity, rms, samples_for,
};
pub use capture::{Microphone, SAMPLE_RATE, SampleChunk, samples_to_wav};
pub use cue::Cue;
pub use device::{AudioIo, CaptureLimits, PlaybackOutcome, Recording, SystemAudio};
pub use playback::{PLAYBACK_SAMPLE_RATE, Speaker, decode_mp3};
pub use stt::{LocalWhisper, Transcriber, WhisperApi};
pub use tts::{OpenAiSpeech, Synthesizer};
pub use wake_word::{WakeSettings, WakeWordDetector, WakeWordListener};
