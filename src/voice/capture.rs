//! Audio capture from microphone
//!
//! The input stream lives on a dedicated thread (cpal streams aren't `Send`) and fans
//! sample chunks out over a broadcast channel, so utterance capture, the wake-word
//! listener and the barge-in monitor can all read the microphone at once.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::broadcast;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Chunks buffered per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 1024;

/// A chunk of mono f32 samples as delivered by the input callback
pub type SampleChunk = Arc<[f32]>;

/// Shared handle to the default input device
pub struct Microphone {
    chunks: broadcast::Sender<SampleChunk>,
    // Dropping this ends the capture thread
    _stop: std_mpsc::Sender<()>,
}

impl Microphone {
    /// Open the default input device and start streaming
    ///
    /// # Errors
    ///
    /// Returns error if the audio device cannot be opened
    pub fn open() -> Result<Self> {
        let (chunks, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let sender = chunks.clone();
        std::thread::Builder::new()
            .name("parley-mic".to_string())
            .spawn(move || {
                let stream = match start_input_stream(sender) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Blocks until the Microphone is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio capture stopped");
            })?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("capture thread exited during startup".to_string()))??;

        Ok(Self {
            chunks,
            _stop: stop_tx,
        })
    }

    /// Receive every chunk captured from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SampleChunk> {
        self.chunks.subscribe()
    }
}

fn start_input_stream(sender: broadcast::Sender<SampleChunk>) -> Result<Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // No subscribers is fine; nobody is listening right now
                let _ = sender.send(Arc::from(data));
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    tracing::debug!("audio capture started");

    Ok(stream)
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
