//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How often the playing thread checks for completion or a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Plays audio to the default output device
#[derive(Debug, Clone)]
pub struct Speaker {
    config: StreamConfig,
}

impl Speaker {
    /// Create a new speaker instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }

    /// Play samples on the calling thread until finished or `stop` is raised
    ///
    /// Returns `true` if every sample was played and `false` if `stop` cut it short.
    /// Must run off the async runtime (e.g. inside `spawn_blocking`) since it blocks
    /// for the clip's duration.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be opened, or if the device stops
    /// pulling samples before the clip ends
    pub fn play_blocking(&self, samples: Vec<f32>, stop: &Arc<AtomicBool>) -> Result<bool> {
        if samples.is_empty() {
            return Ok(true);
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let channels = self.config.channels as usize;
        let sample_count = samples.len();
        let samples: Arc<[f32]> = samples.into();
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            let stop = Arc::clone(stop);

            device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let halted = stop.load(Ordering::Relaxed);
                        let mut pos = position.load(Ordering::Relaxed);

                        for frame in data.chunks_mut(channels) {
                            let sample = if !halted && pos < samples.len() {
                                pos += 1;
                                samples[pos - 1]
                            } else {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            };

                            for out in frame.iter_mut() {
                                *out = sample;
                            }
                        }

                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let timeout = Duration::from_millis(duration_ms + 500);
        let end = wait_for_playback(&finished, stop, timeout);

        if end == PlaybackEnd::Finished {
            // Let the device drain its last buffer
            std::thread::sleep(Duration::from_millis(100));
        }

        drop(stream);
        let played = position.load(Ordering::Relaxed);
        tracing::debug!(samples = sample_count, played, ?end, "playback finished");

        match end {
            PlaybackEnd::Finished => Ok(true),
            PlaybackEnd::Stopped => Ok(false),
            PlaybackEnd::TimedOut => {
                tracing::warn!(
                    samples = sample_count,
                    played,
                    timeout_ms = timeout.as_millis(),
                    "output device stalled"
                );
                Err(Error::Audio(format!(
                    "output device stalled after {played} of {sample_count} samples"
                )))
            }
        }
    }
}

/// How the wait for a clip ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackEnd {
    Finished,
    Stopped,
    TimedOut,
}

/// Poll until the stream reports `finished`, `stop` is raised, or `timeout` passes
fn wait_for_playback(finished: &AtomicBool, stop: &AtomicBool, timeout: Duration) -> PlaybackEnd {
    let start = Instant::now();
    loop {
        if stop.load(Ordering::Relaxed) {
            return PlaybackEnd::Stopped;
        }
        if finished.load(Ordering::Relaxed) {
            return PlaybackEnd::Finished;
        }
        if start.elapsed() > timeout {
            return PlaybackEnd::TimedOut;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Decode MP3 bytes to f32 samples
///
/// # Errors
///
/// Returns error if the data is not decodable MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
