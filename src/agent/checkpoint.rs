//! In-process thread history for [`LlmAgent`](super::LlmAgent).

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::AgentMessage;
use crate::session::ThreadId;

/// Per-thread message history kept for the lifetime of the process.
///
/// Threads are remembered in the order their first message was recorded.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    inner: RwLock<CheckpointInner>,
}

#[derive(Debug, Default)]
struct CheckpointInner {
    order: Vec<ThreadId>,
    history: HashMap<ThreadId, Vec<AgentMessage>>,
}

impl MemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message on `thread_id`, creating the thread if needed.
    pub async fn append(&self, thread_id: &ThreadId, message: AgentMessage) {
        let mut guard = self.inner.write().await;
        if !guard.history.contains_key(thread_id) {
            guard.order.push(thread_id.clone());
        }
        guard
            .history
            .entry(thread_id.clone())
            .or_default()
            .push(message);
    }

    /// History of `thread_id`; empty for unknown threads.
    pub async fn messages(&self, thread_id: &ThreadId) -> Vec<AgentMessage> {
        self.inner
            .read()
            .await
            .history
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Known thread ids, oldest first.
    pub async fn thread_ids(&self) -> Vec<ThreadId> {
        self.inner.read().await.order.clone()
    }
}
