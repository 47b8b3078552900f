//! Agent backed by an LLM driver and an in-memory checkpointer.

use std::sync::Arc;

use futures::StreamExt;

use super::{
    AgentError, AgentMessage, AgentState, ConversationAgent, FragmentStream, MemoryCheckpointer,
    TextFragment,
};
use crate::llm::{ChatMessage, LlmDriver, LlmRequest};
use crate::session::ThreadId;

/// A [`ConversationAgent`] that generates replies with an [`LlmDriver`].
///
/// The agent owns thread history. Each submission is recorded before the
/// model is called, and the assistant reply is recorded only once the driver
/// stream completes without error.
#[derive(Clone)]
pub struct LlmAgent {
    driver: Arc<dyn LlmDriver>,
    checkpoints: Arc<MemoryCheckpointer>,
    system_prompt: Option<String>,
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("driver", &"LlmDriver")
            .field("system_prompt", &self.system_prompt)
            .finish_non_exhaustive()
    }
}

impl LlmAgent {
    pub fn new(driver: Arc<dyn LlmDriver>, checkpoints: Arc<MemoryCheckpointer>) -> Self {
        Self {
            driver,
            checkpoints,
            system_prompt: None,
        }
    }

    /// Prepend `prompt` as a system message to every model request.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    fn build_request(&self, history: &[AgentMessage]) -> LlmRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend(history.iter().map(ChatMessage::from));
        LlmRequest { messages }
    }
}

#[async_trait::async_trait]
impl ConversationAgent for LlmAgent {
    async fn get_state(&self, thread_id: &ThreadId) -> Result<AgentState, AgentError> {
        Ok(AgentState {
            messages: self.checkpoints.messages(thread_id).await,
        })
    }

    async fn list_thread_ids(&self) -> Result<Vec<ThreadId>, AgentError> {
        Ok(self.checkpoints.thread_ids().await)
    }

    async fn stream(
        &self,
        thread_id: &ThreadId,
        message: &str,
    ) -> Result<FragmentStream, AgentError> {
        self.checkpoints
            .append(thread_id, AgentMessage::human(message))
            .await;
        let history = self.checkpoints.messages(thread_id).await;
        let req = self.build_request(&history);

        tracing::debug!(
            thread_id = %thread_id,
            message_count = req.messages.len(),
            "Opening model stream"
        );

        let mut deltas = self.driver.stream(req).await.map_err(driver_error)?;
        let checkpoints = Arc::clone(&self.checkpoints);
        let thread_id = thread_id.clone();

        let out = async_stream::stream! {
            let mut reply = String::new();
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(delta) => {
                        reply.push_str(&delta);
                        yield Ok::<TextFragment, AgentError>(TextFragment::new(delta));
                    }
                    Err(e) => {
                        tracing::warn!(thread_id = %thread_id, error = %e, "Model stream failed");
                        yield Err(driver_error(e));
                        return;
                    }
                }
            }
            checkpoints.append(&thread_id, AgentMessage::other(reply)).await;
        };

        Ok(Box::pin(out))
    }
}

/// Classify a driver failure.
fn driver_error(e: anyhow::Error) -> AgentError {
    if let Some(re) = e.downcast_ref::<reqwest::Error>() {
        if let Some(status) = re.status() {
            return AgentError::Upstream {
                status: status.as_u16(),
                message: re.to_string(),
            };
        }
        if re.is_connect() || re.is_timeout() {
            return AgentError::Unavailable(format!("{e:#}"));
        }
    }
    match e.downcast::<serde_json::Error>() {
        Ok(json) => AgentError::Decode(json),
        Err(e) => AgentError::Other(e),
    }
}
