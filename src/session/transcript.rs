//! The active transcript of a session.

use serde::{Deserialize, Serialize};

use super::ThreadId;

/// Role of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only message history bound to exactly one thread.
#[derive(Debug, Clone)]
pub struct Transcript {
    thread_id: ThreadId,
    messages: Vec<Message>,
}

impl Transcript {
    /// An empty transcript bound to `thread_id`.
    #[must_use]
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            messages: Vec::new(),
        }
    }

    /// Bind to `thread_id` with no messages.
    pub fn reset(&mut self, thread_id: ThreadId) {
        self.thread_id = thread_id;
        self.messages = Vec::new();
    }

    /// Bind to `thread_id` holding exactly `messages`.
    ///
    /// Callers load history first and swap it in here, so the transcript is
    /// never observed half-replaced.
    pub fn switch_to(&mut self, thread_id: ThreadId, messages: Vec<Message>) {
        self.thread_id = thread_id;
        self.messages = messages;
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
