//! Port to the external conversational agent.
//!
//! The chat core never reasons, generates or persists anything itself. It
//! talks to an agent through [`ConversationAgent`], which exposes exactly three
//! capabilities: reading a thread's persisted state, enumerating known
//! threads, and streaming a reply to one new user message.
//!
//! # Implementations
//!
//! - [`LlmAgent`]: keeps thread history in a [`MemoryCheckpointer`] and
//!   generates replies through an [`LlmDriver`](crate::llm::LlmDriver).

pub mod checkpoint;
pub mod llm;

pub use checkpoint::MemoryCheckpointer;
pub use llm::LlmAgent;

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::session::ThreadId;

/// Who authored a persisted agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorKind {
    /// Written by the human user.
    Human,
    /// Anything else (assistant output, tool output, system text).
    Other,
}

/// A message as the agent stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Author tag.
    pub kind: AuthorKind,
    /// Text payload.
    pub text: String,
}

impl AgentMessage {
    /// A human-authored message.
    #[must_use]
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            kind: AuthorKind::Human,
            text: text.into(),
        }
    }

    /// A message from any non-human author.
    #[must_use]
    pub fn other(text: impl Into<String>) -> Self {
        Self {
            kind: AuthorKind::Other,
            text: text.into(),
        }
    }
}

/// Persisted conversation state of one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Messages in chronological order. Empty for unknown threads.
    pub messages: Vec<AgentMessage>,
}

/// One incremental piece of a streamed reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFragment {
    /// Text to append. May be empty.
    pub delta: String,
}

impl TextFragment {
    #[must_use]
    pub fn new(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
        }
    }
}

/// Ordered, finite, non-restartable sequence of reply fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<TextFragment, AgentError>> + Send>>;

/// Failures reported by an agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent could not be reached.
    #[error("agent unavailable: {0}")]
    Unavailable(String),

    /// The agent answered with an error status.
    #[error("agent returned {status}: {message}")]
    Upstream {
        /// HTTP-style status code reported by the agent.
        status: u16,
        /// Error body or reason.
        message: String,
    },

    /// A payload from the agent could not be decoded.
    #[error("failed to decode agent payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other failure, typically from an HTTP driver.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Short machine-readable code used in error events.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "agent_unavailable",
            Self::Upstream { .. } => "agent_upstream",
            Self::Decode(_) => "agent_decode",
            Self::Other(_) => "agent_error",
        }
    }
}

/// The external conversational agent.
///
/// Implementations own durable history. Callers send only the new user
/// message; the agent recovers prior turns from its own state keyed by
/// [`ThreadId`].
#[async_trait::async_trait]
pub trait ConversationAgent: Send + Sync {
    /// Persisted state for `thread_id`, or an empty state if none exists.
    async fn get_state(&self, thread_id: &ThreadId) -> Result<AgentState, AgentError>;

    /// Every persisted thread id, oldest first.
    async fn list_thread_ids(&self) -> Result<Vec<ThreadId>, AgentError>;

    /// Submit `message` to `thread_id` and stream the reply.
    async fn stream(&self, thread_id: &ThreadId, message: &str)
    -> Result<FragmentStream, AgentError>;
}
