//! Rebuilds a transcript from the agent's persisted thread state.

use super::{Message, Role, ThreadId};
use crate::agent::{AgentError, AgentMessage, AuthorKind, ConversationAgent};

impl From<AgentMessage> for Message {
    fn from(message: AgentMessage) -> Self {
        let role = match message.kind {
            AuthorKind::Human => Role::User,
            AuthorKind::Other => Role::Assistant,
        };
        Self {
            role,
            content: message.text,
        }
    }
}

/// Load the history of `thread_id` as transcript messages, in original order.
///
/// A thread the agent has never seen loads as an empty history.
pub async fn load_conversation(
    agent: &dyn ConversationAgent,
    thread_id: &ThreadId,
) -> Result<Vec<Message>, AgentError> {
    let state = agent.get_state(thread_id).await?;
    Ok(state.messages.into_iter().map(Message::from).collect())
}
