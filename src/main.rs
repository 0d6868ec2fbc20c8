use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use parley::conversation::{Services, SessionSettings};
use parley::voice::{
    AudioIo, Cue, LocalWhisper, Microphone, OpenAiSpeech, Speaker, SystemAudio, Transcriber,
    VoiceActivityDetector, WakeSettings, WakeWordDetector, WakeWordListener, WhisperApi,
    decode_mp3, rms,
};
use parley::{Config, FileMemoryStore, MemoryStore, OpenAiReplyClient, Orchestrator, signal};

/// Parley - a wake-word voice assistant
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Wake phrase to listen for (overrides config and environment)
    #[arg(short, long)]
    wake_word: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output by playing every cue
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Print the remembered facts
    Memory,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
            Command::Memory => show_memory(cli.wake_word).await,
        };
    }

    // A missing API key stops us here, before any task starts
    let config = Config::load(cli.wake_word)?;
    tracing::debug!(
        wake_word = %config.assistant.wake_word,
        chat_model = %config.models.chat,
        memory = %config.memory_path.display(),
        "loaded configuration"
    );

    let audio: Arc<dyn AudioIo> = Arc::new(SystemAudio::open(
        config.audio.silence_threshold,
        VoiceActivityDetector::new(config.audio.voice_threshold, config.audio.voice_frames),
    )?);

    let transcriber: Arc<dyn Transcriber> = Arc::new(WhisperApi::new(
        config.api_key.clone(),
        config.api_base_url.clone(),
        config.models.stt.clone(),
    )?);

    let wake_transcriber: Arc<dyn Transcriber> = if let Some(local) = &config.local_whisper {
        tracing::info!(binary = %local.binary.display(), "using local whisper for wake word");
        Arc::new(LocalWhisper::new(local.binary.clone(), local.model.clone()))
    } else {
        tracing::warn!("no local whisper configured, wake word clips use the cloud transcriber");
        Arc::clone(&transcriber)
    };

    let services = Services {
        audio: Arc::clone(&audio),
        transcriber,
        replies: Arc::new(OpenAiReplyClient::new(
            config.api_key.clone(),
            config.api_base_url.clone(),
            config.models.chat.clone(),
        )?),
        synthesizer: Arc::new(OpenAiSpeech::new(
            config.api_key.clone(),
            config.api_base_url.clone(),
            config.models.tts.clone(),
            config.models.tts_voice.clone(),
            config.models.tts_instructions.clone(),
        )?),
        memory: Arc::new(FileMemoryStore::new(
            config.memory_path.clone(),
            config.limits.memory,
        )),
    };

    let root = CancellationToken::new();
    spawn_shutdown_listener(root.clone());

    let (wake_tx, wake_rx) = signal::slot();
    let listener = WakeWordListener::new(
        Arc::clone(&audio),
        wake_transcriber,
        WakeWordDetector::new(vec![config.assistant.wake_word.clone()])?,
        WakeSettings {
            clip: config.audio.wake_clip,
            idle: config.audio.wake_idle,
        },
    );

    if let Err(e) = audio.play_cue(Cue::Startup).await {
        tracing::warn!(error = %e, "failed to play startup cue");
    }

    let wake_task = tokio::spawn(listener.run(wake_tx, root.clone()));
    tracing::info!("parley ready - say \"{}\"", config.assistant.wake_word);

    Orchestrator::new(services, SessionSettings::from(&config), root.clone())
        .with_shutdown_grace(config.shutdown_grace)
        .run(wake_rx)
        .await;

    root.cancel();
    if let Err(e) = wake_task.await {
        tracing::warn!(error = %e, "wake word listener failed");
    }

    tracing::info!("parley stopped");
    Ok(())
}

/// Cancel `root` on Ctrl+C or SIGTERM
fn spawn_shutdown_listener(root: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }

        tracing::info!("shutdown signal received");
        root.cancel();
    });
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mic = Microphone::open()?;
    let mut chunks = mic.subscribe();
    let vad = VoiceActivityDetector::default();
    println!("Sample rate: {} Hz", parley::voice::SAMPLE_RATE);
    println!("---");

    for i in 0..duration {
        let mut samples = Vec::new();
        let second = tokio::time::sleep(Duration::from_secs(1));
        tokio::pin!(second);

        loop {
            tokio::select! {
                () = &mut second => break,
                chunk = chunks.recv() => match chunk {
                    Ok(chunk) => samples.extend_from_slice(&chunk),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        anyhow::bail!("microphone stream closed");
                    }
                },
            }
        }

        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);
        let verdict = if vad.classify(&samples) { "voice" } else { "quiet" };

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}] {}",
            i + 1,
            energy,
            peak,
            meter,
            verdict
        );
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output by playing each cue
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");

    let speaker = Speaker::new()?;
    for cue in [Cue::Startup, Cue::Notification, Cue::Error] {
        println!("Playing {cue:?} cue...");
        play(&speaker, cue.samples()).await?;
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    println!("\n---");
    println!("If you heard three cues, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(None)?;
    let speech = OpenAiSpeech::new(
        config.api_key,
        config.api_base_url,
        config.models.tts,
        config.models.tts_voice,
        config.models.tts_instructions,
    )?;

    println!("Synthesizing speech...");
    let mp3_data = parley::voice::Synthesizer::synthesize(&speech, text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    let speaker = Speaker::new()?;
    play(&speaker, decode_mp3(&mp3_data)?).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

async fn play(speaker: &Speaker, samples: Vec<f32>) -> anyhow::Result<()> {
    let speaker = speaker.clone();
    let stop = Arc::new(AtomicBool::new(false));
    tokio::task::spawn_blocking(move || speaker.play_blocking(samples, &stop)).await??;
    Ok(())
}

/// Print the memory store
async fn show_memory(wake_word: Option<String>) -> anyhow::Result<()> {
    let config = Config::load(wake_word)?;
    let store = FileMemoryStore::new(config.memory_path, config.limits.memory);

    let memory = store.load().await?;
    println!("Memory file: {}", store.path().display());
    if memory.trim().is_empty() {
        println!("(nothing remembered yet)");
    } else {
        for (i, fact) in memory.lines().enumerate() {
            println!("{:3}. {fact}", i + 1);
        }
    }

    Ok(())
}
