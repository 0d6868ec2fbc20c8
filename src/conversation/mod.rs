//! Conversation data model and session state machine
//!
//! A conversation is a sequence of user/assistant turns owned by exactly one
//! [`Session`]. Outbound requests prepend system messages to the trimmed history.

mod session;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

pub use session::{Session, SessionEnd, SessionReport, SessionState};

use crate::memory::MemoryStore;
use crate::reply::ReplyClient;
use crate::voice::{AudioIo, CaptureLimits, MonitorSettings, Synthesizer, Transcriber};
use crate::{Config, Error, Result};

/// Greeting spoken when a new session starts
pub const DEFAULT_GREETING: &str = "What can I do for you?";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and context
    System,
    /// Something the user said
    User,
    /// Something the assistant said
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single outbound chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Build a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// One utterance in a conversation
///
/// Only user and assistant turns exist; system content never enters history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    /// Create a turn, rejecting the system role
    ///
    /// # Errors
    ///
    /// Returns error if `role` is [`Role::System`]
    pub fn new(role: Role, content: impl Into<String>) -> Result<Self> {
        if role == Role::System {
            return Err(Error::Conversation(
                "system messages cannot be conversation turns".to_string(),
            ));
        }

        Ok(Self {
            role,
            content: content.into(),
        })
    }

    /// A user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// Ordered turns of one session, capped to the most recent `limit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    limit: usize,
}

impl ConversationHistory {
    /// Create an empty history keeping at most `limit` turns
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Append a turn, dropping the oldest turns beyond the limit
    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        self.trim();
    }

    /// Drop turns from the front until at most `limit` remain
    pub fn trim(&mut self) {
        while self.turns.len() > self.limit {
            self.turns.pop_front();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Iterate turns oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Most recent turn
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }
}

/// Assemble the outbound message list for one turn
///
/// Order: current date/time, remembered facts, static instructions, then history.
pub fn build_messages<Tz>(
    now: &DateTime<Tz>,
    memory: &str,
    instructions: &str,
    history: &ConversationHistory,
) -> Vec<ChatMessage>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::system(format!(
        "Today's date time is: {}",
        now.format("%A, %Y-%m-%d %H:%M:%S %:z")
    )));
    messages.push(ChatMessage::system(format!(
        "Assistant memory: {}",
        memory.trim()
    )));
    messages.push(ChatMessage::system(instructions));
    messages.extend(history.iter().map(ChatMessage::from));
    messages
}

/// Default instructions for an assistant woken by `wake_word`
///
/// The assistant is never told to use the wake word as its name: replies are played
/// while the wake listener is still hearing the microphone.
#[must_use]
pub fn default_instructions(wake_word: &str) -> String {
    format!(
        "You are a helpful voice assistant. \
         Never say the word \"{wake_word}\" in your replies, and never introduce yourself by name. \
         Periodically remind the user of timers, todos and other tasks they have asked you to remember. \
         Keep responses short and conversational. \
         Respond only with valid JSON of the form \
         {{\"speak\": \"...\", \"memory\": \"...\", \"continueConversation\": true}}. \
         Only include memory for important information; use an empty string when nothing is worth remembering. \
         If the user asks you to end the conversation, set continueConversation to false. \
         Otherwise set continueConversation to true."
    )
}

/// Collaborators a session talks to
#[derive(Clone)]
pub struct Services {
    pub audio: Arc<dyn AudioIo>,
    pub transcriber: Arc<dyn Transcriber>,
    pub replies: Arc<dyn ReplyClient>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub memory: Arc<dyn MemoryStore>,
}

/// Tunables for a conversation session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Spoken when the session starts
    pub greeting: String,

    /// Static instruction message
    pub instructions: String,

    /// Max turns kept in history
    pub history_limit: usize,

    /// Utterance capture bounds
    pub capture: CaptureLimits,

    /// Barge-in monitor cadence
    pub monitor: MonitorSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            instructions: default_instructions(crate::config::DEFAULT_WAKE_WORD),
            history_limit: 20,
            capture: CaptureLimits::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            greeting: config.assistant.greeting.clone(),
            instructions: config.assistant.instructions.clone(),
            history_limit: config.limits.history,
            capture: CaptureLimits {
                max_duration: config.audio.max_capture,
                silence_timeout: config.audio.silence_timeout,
            },
            monitor: MonitorSettings {
                window: config.audio.monitor_window,
                idle: Duration::ZERO,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn turn_rejects_system_role() {
        assert!(Turn::new(Role::System, "be nice").is_err());
        let turn = Turn::new(Role::User, "hi").unwrap();
        assert_eq!(turn.role(), Role::User);
        assert_eq!(turn.content(), "hi");
    }

    #[test]
    fn history_keeps_most_recent_turns_in_order() {
        let mut history = ConversationHistory::new(3);
        for i in 0..7 {
            history.push(Turn::user(format!("turn {i}")));
        }

        let kept: Vec<_> = history.iter().map(Turn::content).collect();
        assert_eq!(kept, vec!["turn 4", "turn 5", "turn 6"]);
    }

    #[test]
    fn history_under_limit_is_untouched() {
        let mut history = ConversationHistory::new(20);
        history.push(Turn::user("hello"));
        history.push(Turn::assistant("hi there"));
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().map(Turn::role), Some(Role::Assistant));
    }

    #[test]
    fn messages_are_assembled_in_order() {
        let mut history = ConversationHistory::new(5);
        history.push(Turn::user("remind me to call mom"));

        let now = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let messages = build_messages(&now, "call mom\n", "be brief", &history);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("2025-03-14 09:26:53"));
        assert_eq!(messages[1].content, "Assistant memory: call mom");
        assert_eq!(messages[2].content, "be brief");
        assert_eq!(messages[3].role, Role::User);
        assert_eq!(messages[3].content, "remind me to call mom");
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("x")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"x"}"#);
    }

    #[test]
    fn instructions_keep_the_wake_word_out_of_replies() {
        let text = default_instructions("alex");
        assert!(text.contains("Never say the word \"alex\""));
        assert!(!text.contains("Your name is"));
        assert!(text.contains("continueConversation"));
    }
}
