//! Shared test utilities
//!
//! Scripted fakes for every collaborator a session talks to. Fake recordings carry
//! their transcript as the "WAV" bytes and the fake synthesizer returns the text as
//! "audio", so playback events read back as the spoken text.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use parley::conversation::{ChatMessage, Services, SessionSettings};
use parley::signal::Listener;
use parley::voice::{
    AudioIo, CaptureLimits, Cue, MonitorSettings, PlaybackOutcome, Recording, Synthesizer,
    Transcriber,
};
use parley::{Error, MemoryStore, ReplyClient, ReplyResult, Result};

pub const GREETING: &str = "What can I do for you?";

/// One scripted utterance capture
#[derive(Debug, Clone)]
pub enum Utterance {
    Speech(&'static str),
    Silence,
    Fail,
}

/// Something the fake audio device was asked to do
#[derive(Debug, Clone)]
pub enum AudioEvent {
    Capture,
    Cue(Cue),
    Play {
        text: String,
        outcome: Option<PlaybackOutcome>,
        elapsed: Duration,
        /// Whether each token seen by earlier plays was already cancelled
        earlier_tokens_cancelled: Vec<bool>,
    },
}

#[derive(Default)]
struct AudioState {
    utterances: VecDeque<Utterance>,
    clips: VecDeque<&'static str>,
    events: Vec<AudioEvent>,
    play_tokens: Vec<CancellationToken>,
    play_started: Option<Instant>,
    barge_in_after: Option<Duration>,
    play_duration: Duration,
}

/// Scripted microphone and speaker
pub struct FakeAudio {
    state: Mutex<AudioState>,
}

impl FakeAudio {
    pub fn new(utterances: impl IntoIterator<Item = Utterance>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(AudioState {
                utterances: utterances.into_iter().collect(),
                play_duration: Duration::from_millis(50),
                ..AudioState::default()
            }),
        })
    }

    /// Every playback lasts `duration` unless interrupted
    pub fn set_play_duration(&self, duration: Duration) {
        self.state.lock().unwrap().play_duration = duration;
    }

    /// The user starts talking `after` into the next reply playback
    pub fn barge_in_after(&self, after: Duration) {
        self.state.lock().unwrap().barge_in_after = Some(after);
    }

    /// Queue wake clips; the string is what the clip "says" (empty = silent)
    pub fn push_clips(&self, clips: impl IntoIterator<Item = &'static str>) {
        self.state.lock().unwrap().clips.extend(clips);
    }

    pub fn push_utterances(&self, utterances: impl IntoIterator<Item = Utterance>) {
        self.state.lock().unwrap().utterances.extend(utterances);
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn played_texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AudioEvent::Play { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn cues(&self) -> Vec<Cue> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AudioEvent::Cue(cue) => Some(cue),
                _ => None,
            })
            .collect()
    }

    /// Wait until `done` holds for the recorded events
    pub async fn wait_for(&self, done: impl Fn(&[AudioEvent]) -> bool) {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                if done(&self.state.lock().unwrap().events) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for audio events");
    }

    fn record(&self, event: AudioEvent) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl AudioIo for FakeAudio {
    async fn capture(&self, _limits: CaptureLimits) -> Result<Recording> {
        self.record(AudioEvent::Capture);
        let next = self.state.lock().unwrap().utterances.pop_front();

        match next {
            Some(Utterance::Speech(text)) => Ok(Recording {
                wav: text.as_bytes().to_vec(),
                duration: Duration::from_secs(1),
                voiced: true,
            }),
            Some(Utterance::Silence) => Ok(Recording {
                wav: Vec::new(),
                duration: Duration::from_secs(3),
                voiced: false,
            }),
            Some(Utterance::Fail) => Err(Error::Capture("scripted capture failure".to_string())),
            // Nothing scripted: the user is still thinking
            None => std::future::pending().await,
        }
    }

    async fn record_clip(&self, duration: Duration) -> Result<Recording> {
        tokio::time::sleep(duration).await;
        let clip = self.state.lock().unwrap().clips.pop_front().unwrap_or("");
        Ok(Recording {
            wav: clip.as_bytes().to_vec(),
            duration,
            voiced: !clip.is_empty(),
        })
    }

    async fn listen_short(&self, window: Duration) -> Result<bool> {
        tokio::time::sleep(window).await;
        let mut state = self.state.lock().unwrap();
        let heard = match (state.barge_in_after, state.play_started) {
            (Some(after), Some(started)) => started.elapsed() >= after,
            _ => false,
        };
        if heard {
            state.barge_in_after = None;
        }
        Ok(heard)
    }

    async fn play(
        &self,
        audio: &[u8],
        interrupt: &mut Listener,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        let text = String::from_utf8_lossy(audio).into_owned();
        let started = Instant::now();
        let (duration, earlier_tokens_cancelled) = {
            let mut state = self.state.lock().unwrap();
            let earlier = state
                .play_tokens
                .iter()
                .map(CancellationToken::is_cancelled)
                .collect();
            state.play_tokens.push(cancel.clone());
            state.play_started = Some(started);
            (state.play_duration, earlier)
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            () = interrupt.fired() => Ok(PlaybackOutcome::Interrupted),
            () = tokio::time::sleep(duration) => Ok(PlaybackOutcome::Completed),
        };

        self.record(AudioEvent::Play {
            text,
            outcome: result.as_ref().ok().copied(),
            elapsed: started.elapsed(),
            earlier_tokens_cancelled,
        });
        result
    }

    async fn play_cue(&self, cue: Cue) -> Result<()> {
        self.record(AudioEvent::Cue(cue));
        Ok(())
    }
}

/// Transcribes fake recordings by reading their bytes as text
#[derive(Default)]
pub struct EchoTranscriber {
    calls: Mutex<usize>,
    fail: Mutex<bool>,
}

impl EchoTranscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let transcriber = Self::default();
        *transcriber.fail.lock().unwrap() = true;
        Arc::new(transcriber)
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        if *self.fail.lock().unwrap() {
            return Err(Error::Stt("scripted transcription failure".to_string()));
        }

        let text = String::from_utf8_lossy(wav).trim().to_string();
        if text.is_empty() {
            return Err(Error::Stt("empty transcript".to_string()));
        }
        Ok(text)
    }
}

/// One scripted reply
pub enum ReplyStep {
    Reply(ReplyResult),
    Malformed,
    /// Signal `entered`, then block until `release`
    Gated {
        reply: ReplyResult,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    },
}

/// Reply client answering from a script
pub struct ScriptedReplies {
    steps: Mutex<VecDeque<ReplyStep>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedReplies {
    pub fn new(steps: impl IntoIterator<Item = ReplyStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, step: ReplyStep) {
        self.steps.lock().unwrap().push_back(step);
    }

    /// Message lists received so far
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyClient for ScriptedReplies {
    async fn reply(&self, messages: &[ChatMessage]) -> Result<ReplyResult> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let step = self.steps.lock().unwrap().pop_front();

        match step {
            Some(ReplyStep::Reply(reply)) => Ok(reply),
            Some(ReplyStep::Malformed) => ReplyResult::parse("Sure thing!"),
            Some(ReplyStep::Gated {
                reply,
                entered,
                release,
            }) => {
                entered.notify_one();
                release.notified().await;
                Ok(reply)
            }
            None => std::future::pending().await,
        }
    }
}

pub fn reply(speak: &str, memory: &str, continue_conversation: bool) -> ReplyResult {
    ReplyResult {
        speak: speak.to_string(),
        memory: memory.to_string(),
        continue_conversation,
    }
}

/// Synthesizer returning the text itself as audio
#[derive(Default)]
pub struct EchoSynthesizer;

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Synthesizer that voices the greeting but fails on every reply
#[derive(Default)]
pub struct GreetingOnlySynthesizer;

#[async_trait]
impl Synthesizer for GreetingOnlySynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text == GREETING {
            return Ok(text.as_bytes().to_vec());
        }
        Err(Error::Tts("scripted synthesis failure".to_string()))
    }
}

/// Store whose reads succeed (empty) and whose writes always fail
#[derive(Default)]
pub struct ReadOnlyStore {
    saves: Mutex<usize>,
}

impl ReadOnlyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl MemoryStore for ReadOnlyStore {
    async fn load(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn save(&self, _fact: &str) -> Result<()> {
        *self.saves.lock().unwrap() += 1;
        Err(Error::Memory("disk is read-only".to_string()))
    }
}

/// In-memory fact list with the store's dedup and cap rules
pub struct InMemoryStore {
    facts: Mutex<Vec<String>>,
    limit: usize,
}

impl InMemoryStore {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            facts: Mutex::new(Vec::new()),
            limit,
        })
    }

    pub fn facts(&self) -> Vec<String> {
        self.facts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self) -> Result<String> {
        Ok(self.facts.lock().unwrap().join("\n"))
    }

    async fn save(&self, fact: &str) -> Result<()> {
        let fact = fact.trim();
        if fact.is_empty() {
            return Ok(());
        }

        let mut facts = self.facts.lock().unwrap();
        if !facts.iter().any(|f| f == fact) {
            facts.push(fact.to_string());
        }
        let excess = facts.len().saturating_sub(self.limit);
        facts.drain(..excess);
        Ok(())
    }
}

/// Session settings with the default greeting and a 300ms monitor window
pub fn settings() -> SessionSettings {
    SessionSettings {
        greeting: GREETING.to_string(),
        instructions: "Be brief.".to_string(),
        history_limit: 20,
        capture: CaptureLimits::default(),
        monitor: MonitorSettings {
            window: Duration::from_millis(300),
            idle: Duration::ZERO,
        },
    }
}

pub fn services(
    audio: &Arc<FakeAudio>,
    replies: &Arc<ScriptedReplies>,
    memory: Arc<dyn MemoryStore>,
) -> Services {
    Services {
        audio: Arc::clone(audio) as Arc<dyn AudioIo>,
        transcriber: EchoTranscriber::new(),
        replies: Arc::clone(replies) as Arc<dyn ReplyClient>,
        synthesizer: Arc::new(EchoSynthesizer),
        memory,
    }
}
