//! Parley - wake-word driven voice conversations
//!
//! This library provides the core of the parley assistant:
//! - Wake word listening and session preemption
//! - The conversation session state machine (listen, process, speak)
//! - Barge-in: user speech interrupts playback
//! - Speech-to-text, chat replies and text-to-speech over the `OpenAI` API
//! - A small persisted memory of facts
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  wake signal   ┌──────────────────────────┐
//! │ WakeWordListener │───────────────▶│       Orchestrator       │
//! └──────────────────┘  (capacity 1)  │ cancel old, start new    │
//!                                     └────────────┬─────────────┘
//!                                                  │ child token
//!                                     ┌────────────▼─────────────┐
//!                                     │         Session          │
//!                                     │ Listening ─▶ Processing  │
//!                                     │     ▲           │        │
//!                                     │     └─ Speaking ◀┘        │
//!                                     └───┬─────────┬────────┬───┘
//!                                         │         │        │ interrupt
//!                                  Transcriber  ReplyClient  └─ voice activity monitor
//!                                  Synthesizer  MemoryStore
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod reply;
pub mod signal;
pub mod voice;

pub use config::Config;
pub use conversation::{
    ChatMessage, ConversationHistory, Role, Services, Session, SessionEnd, SessionReport,
    SessionSettings, SessionState, Turn,
};
pub use error::{Error, Result};
pub use memory::{FileMemoryStore, MemoryStore};
pub use orchestrator::{Orchestrator, SessionHandle};
pub use reply::{OpenAiReplyClient, ReplyClient, ReplyResult};
