//! LLM driver trait and the Chat Completions implementation.
//!
//! The [`LlmDriver`] trait is the streaming seam between
//! [`LlmAgent`](crate::agent::LlmAgent) and a model endpoint. A driver takes
//! the full message list of one thread and yields text deltas as the model
//! produces them.
//!
//! # Drivers
//!
//! - [`ChatCompletionsDriver`]: `OpenAI`-compatible Chat Completions API
//!   (`/v1/chat/completions`)

pub mod chat_completions;

pub use chat_completions::ChatCompletionsDriver;

use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentMessage, AuthorKind};

/// LLM connection and model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-4o-mini`, `llama3.2`).
    pub model: String,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
}

/// Role of a message author, as the Chat Completions API spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// A message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author.
    pub role: ChatRole,
    /// Text content.
    pub content: String,
}

impl ChatMessage {
    /// A system prompt message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

impl From<&AgentMessage> for ChatMessage {
    fn from(message: &AgentMessage) -> Self {
        let role = match message.kind {
            AuthorKind::Human => ChatRole::User,
            AuthorKind::Other => ChatRole::Assistant,
        };
        Self {
            role,
            content: message.text.clone(),
        }
    }
}

/// Request to an LLM driver.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Conversation messages, oldest first.
    pub messages: Vec<ChatMessage>,
}

/// Stream of text deltas produced by a driver.
pub type DeltaStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// Trait for LLM streaming drivers.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Stream a response from the LLM.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the connection is interrupted.
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<DeltaStream>;
}
