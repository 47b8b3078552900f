//! Session handles and the process-wide session store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ChatSession, ReplyStream, ThreadId, accept_input, stream_reply};
use crate::agent::{AgentError, ConversationAgent};

/// Shared handle to one chat session.
///
/// The handle serializes every mutation of its [`ChatSession`]. An in-flight
/// reply keeps the session locked; starting any other action first cancels
/// that reply.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    /// Unique session identifier.
    id: String,
    chat: Arc<Mutex<ChatSession>>,
    /// Cancellation token of the latest submission, streaming or still
    /// waiting for the session.
    in_flight: Mutex<Option<CancellationToken>>,
    /// Session creation time.
    created_at: DateTime<Utc>,
    /// Last activity, as Unix milliseconds.
    last_activity: AtomicI64,
}

impl SessionHandle {
    fn new(id: String, chat: ChatSession) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(HandleInner {
                id,
                chat: Arc::new(Mutex::new(chat)),
                in_flight: Mutex::new(None),
                created_at: now,
                last_activity: AtomicI64::new(now.timestamp_millis()),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Run `f` against the current session state.
    ///
    /// Waits for an in-flight reply to finish rather than cancelling it.
    pub async fn read<R>(&self, f: impl FnOnce(&ChatSession) -> R) -> R {
        let guard = self.inner.chat.lock().await;
        f(&guard)
    }

    /// Cancel the latest submission, whether it is streaming or still queued.
    /// Returns whether a reply was holding the session.
    pub async fn cancel_in_flight(&self) -> bool {
        let Some(token) = self.inner.in_flight.lock().await.take() else {
            return false;
        };
        token.cancel();
        let busy = self.is_busy();
        if busy {
            tracing::info!(session_id = %self.id(), "Cancelled in-flight reply");
        }
        busy
    }

    /// Cancel any in-flight reply and take exclusive access to the session.
    async fn acquire(&self) -> OwnedMutexGuard<ChatSession> {
        self.cancel_in_flight().await;
        self.touch();
        Arc::clone(&self.inner.chat).lock_owned().await
    }

    /// Start a new chat on a fresh thread.
    pub async fn new_chat(&self) -> ThreadId {
        let mut chat = self.acquire().await;
        let id = chat.new_chat();
        tracing::info!(session_id = %self.id(), thread_id = %id, "Started new chat");
        id
    }

    /// Switch the active thread, loading its history from `agent`.
    pub async fn switch_to(
        &self,
        agent: &dyn ConversationAgent,
        thread_id: ThreadId,
    ) -> Result<(), AgentError> {
        let mut chat = self.acquire().await;
        tracing::info!(session_id = %self.id(), thread_id = %thread_id, "Switching thread");
        chat.switch_to(agent, thread_id).await
    }

    /// Submit user input and stream the reply.
    ///
    /// Returns `None` when the input is blank; nothing is changed in that
    /// case.
    pub async fn submit(
        &self,
        agent: Arc<dyn ConversationAgent>,
        input: &str,
    ) -> Option<ReplyStream> {
        let text = accept_input(input)?.to_string();

        // Register before waiting so later actions can cancel this one too.
        let token = CancellationToken::new();
        if let Some(previous) = self.inner.in_flight.lock().await.replace(token.clone()) {
            previous.cancel();
        }
        self.touch();
        let chat = Arc::clone(&self.inner.chat).lock_owned().await;

        Some(stream_reply(chat, agent, text, token))
    }

    /// Update the last activity timestamp.
    pub fn touch(&self) {
        self.inner
            .last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Whether a reply is currently holding the session.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.chat.try_lock().is_err()
    }

    /// Check if the session has been idle longer than `timeout`.
    ///
    /// A session with a reply in flight never counts as idle.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        if self.is_busy() {
            return false;
        }
        let last = self.inner.last_activity.load(Ordering::Relaxed);
        let idle_ms = Utc::now().timestamp_millis() - last;
        match u64::try_from(idle_ms) {
            Ok(ms) => Duration::from_millis(ms) > timeout,
            // Negative means clock skew; treat as fresh.
            Err(_) => false,
        }
    }

    /// Get the session age.
    #[must_use]
    pub fn age(&self) -> Duration {
        (Utc::now() - self.inner.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Thread-safe store for sessions.
///
/// Provides methods for creating, retrieving, and cleaning up sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionStore {
    /// Create a new session store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `chat` under a freshly generated session id.
    pub async fn create(&self, chat: ChatSession) -> SessionHandle {
        self.create_with_id(Uuid::new_v4().to_string(), chat).await
    }

    /// Register `chat` under a specific session id, replacing any previous one.
    pub async fn create_with_id(&self, id: impl Into<String>, chat: ChatSession) -> SessionHandle {
        let id = id.into();
        let handle = SessionHandle::new(id.clone(), chat);
        let previous = self.inner.write().await.insert(id, handle.clone());
        if let Some(previous) = previous {
            previous.cancel_in_flight().await;
        }
        handle
    }

    /// Get a session by ID, marking it active.
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        let handle = self.inner.read().await.get(id).cloned();
        if let Some(handle) = &handle {
            handle.touch();
        }
        handle
    }

    /// Remove a session by ID, cancelling its in-flight reply.
    pub async fn remove(&self, id: &str) -> Option<SessionHandle> {
        let removed = self.inner.write().await.remove(id);
        if let Some(handle) = &removed {
            handle.cancel_in_flight().await;
        }
        removed
    }

    /// Get the number of active sessions.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if there are no sessions.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove sessions that have been inactive longer than the timeout.
    ///
    /// Returns the number of sessions removed.
    pub async fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|id, session| {
            let expired = session.is_expired_with_timeout(timeout);
            if expired {
                tracing::debug!(
                    session_id = %id,
                    age_secs = session.age().as_secs(),
                    "Session expired"
                );
            }
            !expired
        });
        before - guard.len()
    }
}
