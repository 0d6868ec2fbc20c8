//! Conversation session state machine
//!
//! One session owns one dialogue: `Listening -> Processing -> Speaking`, looping back
//! to `Listening` until the reply asks to stop (`Ended`) or a failure or
//! cancellation ends it early (`Aborted`). Every suspension point races the
//! session's cancellation token.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{ConversationHistory, Services, SessionSettings, Turn, build_messages};
use crate::signal;
use crate::voice::{Cue, PlaybackOutcome, monitor_voice_activity};
use crate::{Error, Result};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Speaking the greeting
    Greeting,
    /// Capturing a user utterance
    Listening,
    /// Transcribing and waiting for the reply
    Processing,
    /// Playing the reply
    Speaking,
    /// Finished normally
    Ended,
    /// Stopped by cancellation or failure
    Aborted,
}

/// Why a session stopped
#[derive(Debug)]
pub enum SessionEnd {
    /// The conversation finished (reply asked to stop, or the user said nothing)
    Ended,
    /// The session token was cancelled (preemption or shutdown)
    Cancelled,
    /// A turn failed; the error cue was played
    Failed(Error),
}

impl SessionEnd {
    /// Terminal state matching this outcome
    #[must_use]
    pub const fn state(&self) -> SessionState {
        match self {
            Self::Ended => SessionState::Ended,
            Self::Cancelled | Self::Failed(_) => SessionState::Aborted,
        }
    }
}

/// What a finished session leaves behind
#[derive(Debug)]
pub struct SessionReport {
    pub id: u64,
    pub end: SessionEnd,
    pub history: ConversationHistory,
}

/// What follows a completed turn
enum Next {
    Listen,
    Stop,
}

/// A single cancellable conversation
pub struct Session {
    id: u64,
    services: Services,
    settings: Arc<SessionSettings>,
    token: CancellationToken,
    state: watch::Sender<SessionState>,
    memory: String,
}

impl Session {
    #[must_use]
    pub fn new(
        id: u64,
        services: Services,
        settings: Arc<SessionSettings>,
        token: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Greeting);
        Self {
            id,
            services,
            settings,
            token,
            state,
            memory: String::new(),
        }
    }

    /// Observe state transitions
    #[must_use]
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run the conversation to completion
    pub async fn run(mut self) -> SessionReport {
        tracing::info!(session = self.id, "session started");

        let mut history = ConversationHistory::new(self.settings.history_limit);
        let end = match self.converse(&mut history).await {
            Ok(()) => SessionEnd::Ended,
            Err(Error::Cancelled) => SessionEnd::Cancelled,
            Err(e) => {
                tracing::error!(session = self.id, error = %e, "session aborted");
                if !self.token.is_cancelled()
                    && let Err(cue_err) = self.services.audio.play_cue(Cue::Error).await
                {
                    tracing::warn!(error = %cue_err, "failed to play error cue");
                }
                SessionEnd::Failed(e)
            }
        };

        self.enter(end.state());
        tracing::info!(
            session = self.id,
            outcome = ?end.state(),
            turns = history.len(),
            "session finished"
        );

        SessionReport {
            id: self.id,
            end,
            history,
        }
    }

    async fn converse(&mut self, history: &mut ConversationHistory) -> Result<()> {
        self.greet().await?;

        self.memory = match self.services.memory.load().await {
            Ok(memory) => memory,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load memory, continuing without it");
                String::new()
            }
        };

        loop {
            match self.turn(history).await? {
                Next::Listen => {}
                Next::Stop => return Ok(()),
            }
        }
    }

    async fn greet(&self) -> Result<()> {
        self.checkpoint()?;
        if self.settings.greeting.is_empty() {
            return Ok(());
        }

        let audio = match self
            .guarded(self.services.synthesizer.synthesize(&self.settings.greeting))
            .await
        {
            Ok(audio) => audio,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "failed to synthesize greeting");
                return Ok(());
            }
        };

        // Nothing interrupts the greeting
        let (_, mut interrupt) = signal::slot();
        match self
            .services
            .audio
            .play(&audio, &mut interrupt, &self.token)
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "failed to play greeting");
                Ok(())
            }
        }
    }

    async fn turn(&self, history: &mut ConversationHistory) -> Result<Next> {
        self.enter(SessionState::Listening);
        self.checkpoint()?;
        let recording = self
            .guarded(self.services.audio.capture(self.settings.capture))
            .await?;
        self.checkpoint()?;

        if !recording.voiced {
            tracing::info!(session = self.id, "no speech heard, ending session");
            return Ok(Next::Stop);
        }

        if let Err(e) = self.guarded(self.services.audio.play_cue(Cue::Notification)).await {
            if e.is_cancelled() {
                return Err(e);
            }
            tracing::debug!(error = %e, "failed to play notification cue");
        }

        self.enter(SessionState::Processing);
        let transcript = self
            .guarded(self.services.transcriber.transcribe(&recording.wav))
            .await?;
        self.checkpoint()?;
        history.push(Turn::user(transcript));

        let messages = build_messages(
            &chrono::Local::now(),
            &self.memory,
            &self.settings.instructions,
            history,
        );
        let reply = self.guarded(self.services.replies.reply(&messages)).await?;
        self.checkpoint()?;

        self.enter(SessionState::Speaking);
        tracing::info!(
            session = self.id,
            speak = %reply.speak,
            continue_conversation = reply.continue_conversation,
            "reply received"
        );
        if !reply.memory.trim().is_empty() {
            self.remember(&reply.memory).await;
        }
        history.push(Turn::assistant(reply.speak.clone()));

        let audio = self
            .guarded(self.services.synthesizer.synthesize(&reply.speak))
            .await?;
        self.speak(&audio).await?;

        Ok(if reply.continue_conversation {
            Next::Listen
        } else {
            Next::Stop
        })
    }

    /// Persist a fact; the in-session memory snapshot is left as loaded at start
    async fn remember(&self, fact: &str) {
        match self.services.memory.save(fact).await {
            Ok(()) => tracing::debug!(session = self.id, fact, "memory saved"),
            Err(e) => tracing::warn!(session = self.id, error = %e, "failed to save memory"),
        }
    }

    /// Play a reply while the barge-in monitor listens
    async fn speak(&self, audio: &[u8]) -> Result<()> {
        let (notifier, mut interrupt) = signal::slot();
        let monitor_token = self.token.child_token();
        let monitor = tokio::spawn(monitor_voice_activity(
            Arc::clone(&self.services.audio),
            self.settings.monitor,
            notifier,
            monitor_token.clone(),
        ));

        let played = self
            .services
            .audio
            .play(audio, &mut interrupt, &self.token)
            .await;

        monitor_token.cancel();
        if let Err(e) = monitor.await {
            tracing::debug!(error = %e, "voice activity monitor panicked");
        }

        match played? {
            PlaybackOutcome::Completed => tracing::debug!(session = self.id, "reply played"),
            PlaybackOutcome::Interrupted => {
                tracing::info!(session = self.id, "reply interrupted by user speech");
            }
        }
        Ok(())
    }

    /// Race `operation` against the session token
    async fn guarded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Error::Cancelled),
            result = operation => result,
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if self.token.is_cancelled() {
            tracing::debug!(session = self.id, "cancellation observed");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn enter(&self, state: SessionState) {
        tracing::debug!(session = self.id, ?state, "session state");
        self.state.send_replace(state);
    }
}
