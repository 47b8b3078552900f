//! Multi-thread streaming chat over a conversational agent.
//!
//! Every browser session keeps a list of conversation threads, shows the
//! transcript of one of them, streams assistant replies token by token and
//! can export the visible transcript as plain text. Durable history lives in
//! the agent, keyed by thread id.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP API with SSE reply streaming
//! - **Agent**: async port over the conversational backend, with an
//!   OpenAI-compatible implementation and in-memory checkpoints
//! - **Sessions**: thread registry, active transcript and cancellation
//!
//! # Modules
//!
//! - [`agent`]: conversational agent port and the LLM-backed agent
//! - [`config`]: layered application configuration
//! - [`error`]: HTTP error responses
//! - [`events`]: streaming event model
//! - [`llm`]: Chat Completions driver
//! - [`server`]: routes and handlers
//! - [`session`]: threads, transcripts and the session store

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod server;
pub mod session;

use std::sync::Arc;

use agent::ConversationAgent;
use session::{EmptyReplyPolicy, SessionStore};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversational backend shared by every session.
    pub agent: Arc<dyn ConversationAgent>,
    /// Session store for live browser sessions.
    pub sessions: SessionStore,
    /// What to do with replies that arrive empty.
    pub empty_replies: EmptyReplyPolicy,
}

impl AppState {
    #[must_use]
    pub fn new(agent: Arc<dyn ConversationAgent>, empty_replies: EmptyReplyPolicy) -> Self {
        Self {
            agent,
            sessions: SessionStore::new(),
            empty_replies,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions)
            .field("empty_replies", &self.empty_replies)
            .finish()
    }
}
