//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use parley::signal;
use parley::voice::{
    AudioIo, MonitorSettings, SAMPLE_RATE, SilenceDetector, VoiceActivityDetector,
    WakeSettings, WakeWordDetector, WakeWordListener, monitor_voice_activity, samples_to_wav,
};

mod common;

use common::{EchoTranscriber, FakeAudio};

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

fn wake_listener(audio: &Arc<FakeAudio>, transcriber: &Arc<EchoTranscriber>) -> WakeWordListener {
    WakeWordListener::new(
        Arc::clone(audio) as Arc<dyn AudioIo>,
        Arc::clone(transcriber) as Arc<dyn parley::voice::Transcriber>,
        WakeWordDetector::new(vec!["alex".to_string()]).unwrap(),
        WakeSettings {
            clip: Duration::from_millis(100),
            idle: Duration::from_millis(10),
        },
    )
}

#[test]
fn test_wake_word_normalization() {
    let detector =
        WakeWordDetector::new(vec!["  Hey ALEX  ".to_string(), "COMPUTER".to_string()]).unwrap();

    // Should be normalized to lowercase and trimmed
    assert_eq!(detector.wake_words(), &["hey alex", "computer"]);
}

#[test]
fn test_wake_word_case_insensitive_substring() {
    let detector = WakeWordDetector::new(vec!["alex".to_string()]).unwrap();

    assert!(detector.matches("hey alex can you help"));
    assert!(detector.matches("HEY ALEX"));
    assert!(detector.matches("Alexa, play music"));
    assert!(!detector.matches("hey alice"));
    assert!(!detector.matches(""));
}

#[test]
fn test_voice_activity_on_tone_and_silence() {
    let vad = VoiceActivityDetector::default();

    assert!(vad.classify(&generate_sine_samples(440.0, 0.3, 0.3)));
    assert!(!vad.classify(&generate_silence(0.3)));
    // Too quiet to count as voice
    assert!(!vad.classify(&generate_sine_samples(440.0, 0.3, 0.01)));
}

#[test]
fn test_short_click_is_not_voice() {
    let vad = VoiceActivityDetector::default();

    let mut samples = generate_silence(0.1);
    samples.extend(generate_sine_samples(440.0, 0.04, 0.5));
    samples.extend(generate_silence(0.16));
    assert!(!vad.classify(&samples));
}

#[test]
fn test_silence_detector_waits_for_trailing_silence() {
    let mut detector = SilenceDetector::new(0.018, Duration::from_millis(500));

    assert!(!detector.push(&generate_sine_samples(440.0, 1.0, 0.3)));
    assert!(!detector.push(&generate_silence(0.4)));
    assert!(detector.push(&generate_silence(0.2)));
    assert!(detector.heard_voice());
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // WAV header is 44 bytes, 16-bit samples follow
    assert_eq!(wav_data.len(), 44 + samples.len() * 2);
}

#[test]
fn test_wav_readback() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    let cursor = Cursor::new(wav_data);
    let mut reader = hound::WavReader::new(cursor).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples, vec![0, 16383, -16383, 32767, -32767, 8191]);
}

#[tokio::test]
async fn test_listener_posts_wake_on_match() {
    let audio = FakeAudio::new([]);
    audio.push_clips(["", "what time is it", "hey alex can you help"]);
    let transcriber = EchoTranscriber::new();
    let listener = wake_listener(&audio, &transcriber);

    assert!(!listener.listen_once().await);
    assert!(!listener.listen_once().await);
    assert!(listener.listen_once().await);

    // The silent clip was never transcribed
    assert_eq!(transcriber.calls(), 2);
}

#[tokio::test]
async fn test_listener_survives_transcription_failures() {
    let audio = FakeAudio::new([]);
    audio.push_clips(["hey alex"]);
    let transcriber = EchoTranscriber::failing();
    let listener = wake_listener(&audio, &transcriber);

    assert!(!listener.listen_once().await);
    assert_eq!(transcriber.calls(), 1);
}

#[tokio::test]
async fn test_pending_wake_is_not_duplicated() {
    let audio = FakeAudio::new([]);
    audio.push_clips(["alex", "alex again", "it's alex"]);
    let transcriber = EchoTranscriber::new();
    let cancel = CancellationToken::new();
    let (wake, mut wakes) = signal::slot();

    let running = tokio::spawn(wake_listener(&audio, &transcriber).run(wake, cancel.clone()));

    // Let all three clips be heard without draining the slot
    tokio::time::timeout(Duration::from_secs(5), async {
        while transcriber.calls() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    assert_ok!(running.await);

    assert!(wakes.try_recv());
    assert!(!wakes.try_recv());
}

#[tokio::test(start_paused = true)]
async fn test_monitor_interrupts_on_voice() {
    let audio = FakeAudio::new([]);
    audio.set_play_duration(Duration::from_secs(5));
    audio.barge_in_after(Duration::from_millis(500));
    let (interrupt_tx, mut interrupt) = signal::slot();
    let cancel = CancellationToken::new();

    let monitor = tokio::spawn(monitor_voice_activity(
        audio.clone(),
        MonitorSettings::default(),
        interrupt_tx,
        cancel.clone(),
    ));

    // Playback drives the fake's clock for the barge-in
    let outcome = audio
        .play(b"a long answer", &mut interrupt, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, parley::voice::PlaybackOutcome::Interrupted);
    assert!(assert_ok!(monitor.await));
}

#[tokio::test(start_paused = true)]
async fn test_monitor_stops_quietly_on_cancel() {
    let audio = FakeAudio::new([]);
    let (interrupt_tx, mut interrupt) = signal::slot();
    let cancel = CancellationToken::new();

    let monitor = tokio::spawn(monitor_voice_activity(
        audio.clone(),
        MonitorSettings::default(),
        interrupt_tx,
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_secs(2)).await;
    cancel.cancel();

    assert!(!assert_ok!(monitor.await));
    assert!(!interrupt.try_recv());
}
