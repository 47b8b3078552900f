//! Chat session state and the streaming reply loop.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Message, ThreadId, ThreadRegistry, Transcript, export_as_text, load_conversation};
use crate::agent::{AgentError, ConversationAgent};
use crate::events::ChatEvent;

/// Stream of events describing one assistant reply.
pub type ReplyStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// What to do with a reply that streamed zero characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyReplyPolicy {
    /// Append an assistant message with empty content.
    #[default]
    Append,
    /// Leave the transcript untouched.
    Suppress,
}

/// One user's chat state: known threads plus the active transcript.
#[derive(Debug)]
pub struct ChatSession {
    registry: ThreadRegistry,
    transcript: Transcript,
    empty_replies: EmptyReplyPolicy,
}

impl ChatSession {
    /// Start a session on a fresh thread, seeding the registry from the
    /// agent's persisted threads.
    ///
    /// A failure to list persisted threads is logged and the session starts
    /// with the fresh thread only.
    pub async fn start(agent: &dyn ConversationAgent, empty_replies: EmptyReplyPolicy) -> Self {
        let persisted = match agent.list_thread_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list persisted threads");
                Vec::new()
            }
        };
        Self::with_persisted(persisted, empty_replies)
    }

    /// Build a session from an already known list of persisted thread ids.
    pub fn with_persisted(
        persisted: impl IntoIterator<Item = ThreadId>,
        empty_replies: EmptyReplyPolicy,
    ) -> Self {
        let active = ThreadId::generate();
        let mut registry = ThreadRegistry::seeded(persisted);
        registry.register(active.clone());
        Self {
            registry,
            transcript: Transcript::new(active),
            empty_replies,
        }
    }

    #[must_use]
    pub fn active_thread_id(&self) -> &ThreadId {
        self.transcript.thread_id()
    }

    #[must_use]
    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Start a new chat on a freshly generated thread.
    pub fn new_chat(&mut self) -> ThreadId {
        let id = ThreadId::generate();
        self.registry.register(id.clone());
        self.transcript.reset(id.clone());
        id
    }

    /// Make `thread_id` active with its persisted history.
    ///
    /// History is loaded before anything changes, so on error the previous
    /// thread and transcript stay in place.
    pub async fn switch_to(
        &mut self,
        agent: &dyn ConversationAgent,
        thread_id: ThreadId,
    ) -> Result<(), AgentError> {
        let messages = load_conversation(agent, &thread_id).await?;
        self.registry.register(thread_id.clone());
        self.transcript.switch_to(thread_id, messages);
        Ok(())
    }

    pub fn append(&mut self, message: Message) {
        self.transcript.append(message);
    }

    /// Record a finished reply. Returns whether a message was appended.
    pub fn complete_reply(&mut self, content: String) -> bool {
        if content.is_empty() && self.empty_replies == EmptyReplyPolicy::Suppress {
            return false;
        }
        self.transcript.append(Message::assistant(content));
        true
    }

    #[must_use]
    pub fn export_text(&self) -> String {
        export_as_text(self.transcript.messages())
    }
}

/// Returns the input if it is worth sending.
///
/// Empty input is dropped, and so is whitespace-only input, which a plain
/// truthiness check would have let through as a message.
#[must_use]
pub fn accept_input(input: &str) -> Option<&str> {
    (!input.trim().is_empty()).then_some(input)
}

/// Running concatenation of reply fragments.
#[derive(Debug, Default)]
pub struct ReplyBuffer {
    content: String,
}

impl ReplyBuffer {
    /// Append a fragment and return everything received so far.
    pub fn push(&mut self, fragment: &str) -> &str {
        self.content.push_str(fragment);
        &self.content
    }

    #[must_use]
    pub fn in_progress(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn into_content(self) -> String {
        self.content
    }
}

/// Append `text` as a user message and stream the agent's reply.
///
/// The session guard lives inside the returned stream, so nothing else can
/// touch the session until the reply finishes, fails, is cancelled, or the
/// stream is dropped. Only a completed reply is appended to the transcript.
pub fn stream_reply(
    mut session: OwnedMutexGuard<ChatSession>,
    agent: Arc<dyn ConversationAgent>,
    text: String,
    cancel: CancellationToken,
) -> ReplyStream {
    let thread_id = session.active_thread_id().clone();
    let request_id = Uuid::new_v4().to_string();

    // Superseded while waiting for the session: leave it untouched.
    if cancel.is_cancelled() {
        drop(session);
        tracing::info!(request_id = %request_id, "Reply cancelled while queued");
        return Box::pin(futures::stream::iter([
            ChatEvent::StreamStart {
                request_id: request_id.clone(),
                thread_id: thread_id.to_string(),
            },
            ChatEvent::Cancelled { request_id },
        ]));
    }

    session.append(Message::user(text.clone()));

    tracing::info!(
        request_id = %request_id,
        thread_id = %thread_id,
        input_length = text.len(),
        "Submitting user message"
    );

    Box::pin(async_stream::stream! {
        yield ChatEvent::StreamStart {
            request_id: request_id.clone(),
            thread_id: thread_id.to_string(),
        };

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = agent.stream(&thread_id, &text) => Some(result),
        };

        let mut fragments = match opened {
            None => {
                tracing::info!(request_id = %request_id, "Reply cancelled before start");
                yield ChatEvent::Cancelled { request_id };
                return;
            }
            Some(Err(e)) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to open agent stream");
                yield ChatEvent::Error {
                    message: e.to_string(),
                    code: Some(e.code().to_string()),
                };
                return;
            }
            Some(Ok(stream)) => stream,
        };

        let mut buffer = ReplyBuffer::default();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                item = fragments.next() => Some(item),
            };

            match next {
                None => {
                    tracing::info!(
                        request_id = %request_id,
                        discarded = buffer.in_progress().len(),
                        "Reply cancelled, partial output discarded"
                    );
                    yield ChatEvent::Cancelled { request_id };
                    return;
                }
                Some(None) => break,
                Some(Some(Ok(fragment))) => {
                    let content = buffer.push(&fragment.delta).to_string();
                    yield ChatEvent::MessageDelta {
                        text: fragment.delta,
                        content,
                    };
                }
                Some(Some(Err(e))) => {
                    tracing::error!(request_id = %request_id, error = %e, "Agent stream failed");
                    yield ChatEvent::Error {
                        message: e.to_string(),
                        code: Some(e.code().to_string()),
                    };
                    return;
                }
            }
        }

        let content = buffer.into_content();
        let appended = session.complete_reply(content.clone());

        tracing::info!(
            request_id = %request_id,
            thread_id = %thread_id,
            content_length = content.len(),
            appended = appended,
            "Reply completed"
        );

        yield ChatEvent::Done { content, appended };
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::sync::Mutex;

    use super::*;
    use crate::agent::AgentMessage;
    use crate::agent::testing::ScriptedAgent;
    use crate::session::Role;

    async fn drain(stream: ReplyStream) -> Vec<ChatEvent> {
        stream.collect().await
    }

    fn fresh(policy: EmptyReplyPolicy) -> Arc<Mutex<ChatSession>> {
        Arc::new(Mutex::new(ChatSession::with_persisted(Vec::new(), policy)))
    }

    #[test]
    fn test_new_session_has_single_chat_1() {
        let session = ChatSession::with_persisted(Vec::new(), EmptyReplyPolicy::Append);
        let threads: Vec<_> = session.registry().list().collect();
        assert_eq!(threads.len(), 1);
        assert_eq!(&threads[0].id, session.active_thread_id());
        assert_eq!(threads[0].label, "Chat 1");
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn test_fresh_thread_labelled_after_persisted() {
        let persisted = vec![ThreadId::from("old-1"), ThreadId::from("old-2")];
        let session = ChatSession::with_persisted(persisted, EmptyReplyPolicy::Append);
        assert_eq!(
            session.registry().label_of(session.active_thread_id()),
            "Chat 3"
        );
        assert_eq!(session.registry().label_of(&ThreadId::from("old-1")), "Chat 1");
    }

    #[tokio::test]
    async fn test_start_survives_listing_failure() {
        let agent = ScriptedAgent {
            fail_listing: true,
            ..ScriptedAgent::default()
        };
        let session = ChatSession::start(&agent, EmptyReplyPolicy::Append).await;
        assert_eq!(session.registry().len(), 1);
    }

    #[test]
    fn test_new_chat_resets_transcript() {
        let mut session = ChatSession::with_persisted(Vec::new(), EmptyReplyPolicy::Append);
        session.append(Message::user("hi"));
        let first = session.active_thread_id().clone();

        let second = session.new_chat();

        assert_ne!(first, second);
        assert!(session.transcript().is_empty());
        assert_eq!(session.registry().label_of(&second), "Chat 2");
    }

    #[tokio::test]
    async fn test_switch_matches_loaded_history_without_stale_content() {
        let thread = ThreadId::from("history");
        let agent = ScriptedAgent::with_threads(vec![(
            thread.clone(),
            vec![AgentMessage::human("q"), AgentMessage::other("a")],
        )]);
        let mut session = ChatSession::start(&agent, EmptyReplyPolicy::Append).await;
        session.append(Message::user("stale"));

        session.switch_to(&agent, thread.clone()).await.unwrap();

        let loaded = load_conversation(&agent, &thread).await.unwrap();
        assert_eq!(session.transcript().messages(), loaded.as_slice());
        assert_eq!(session.active_thread_id(), &thread);
    }

    #[tokio::test]
    async fn test_switch_to_unknown_thread_registers_it_empty() {
        let agent = ScriptedAgent::default();
        let mut session = ChatSession::start(&agent, EmptyReplyPolicy::Append).await;
        let unknown = ThreadId::from("elsewhere");

        session.switch_to(&agent, unknown.clone()).await.unwrap();

        assert!(session.transcript().is_empty());
        assert!(session.registry().contains(&unknown));
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_previous_state() {
        let agent = ScriptedAgent::default();
        let mut session = ChatSession::start(&agent, EmptyReplyPolicy::Append).await;
        session.append(Message::user("keep me"));
        let before = session.active_thread_id().clone();
        agent.fail_state.store(true, Ordering::SeqCst);

        assert!(session.switch_to(&agent, ThreadId::from("x")).await.is_err());

        assert_eq!(session.active_thread_id(), &before);
        assert_eq!(session.transcript().messages(), &[Message::user("keep me")]);
        assert!(!session.registry().contains(&ThreadId::from("x")));
    }

    #[test]
    fn test_accept_input() {
        assert_eq!(accept_input("Hello"), Some("Hello"));
        assert_eq!(accept_input("  padded "), Some("  padded "));
        assert_eq!(accept_input(""), None);
        assert_eq!(accept_input(" \n\t"), None);
    }

    #[test]
    fn test_reply_buffer_prefixes() {
        let fragments = ["a", "", "bc", "d"];
        let mut buffer = ReplyBuffer::default();
        let mut expected = String::new();
        for f in fragments {
            expected.push_str(f);
            assert_eq!(buffer.push(f), expected);
        }
        assert_eq!(buffer.into_content(), "abcd");
    }

    #[tokio::test]
    async fn test_hello_scenario() {
        let agent = Arc::new(ScriptedAgent::default());
        agent.push_reply(&["Hi ", "there"]).await;
        let session = fresh(EmptyReplyPolicy::Append);

        let guard = Arc::clone(&session).lock_owned().await;
        let stream = stream_reply(guard, agent.clone(), "Hello".into(), CancellationToken::new());
        let events = drain(stream).await;

        let deltas: Vec<(&str, &str)> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::MessageDelta { text, content } => Some((text.as_str(), content.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec![("Hi ", "Hi "), ("there", "Hi there")]);
        assert_eq!(
            events.last(),
            Some(&ChatEvent::Done {
                content: "Hi there".to_string(),
                appended: true
            })
        );

        let session = session.lock().await;
        assert_eq!(
            session.transcript().messages(),
            &[Message::user("Hello"), Message::assistant("Hi there")]
        );
        let submitted = agent.submitted.lock().await;
        assert_eq!(submitted[0].0, *session.active_thread_id());
        assert_eq!(submitted[0].1, "Hello");
    }

    #[tokio::test]
    async fn test_user_message_visible_before_stream_is_polled() {
        let agent = Arc::new(ScriptedAgent::default());
        let session = fresh(EmptyReplyPolicy::Append);

        let guard = Arc::clone(&session).lock_owned().await;
        let stream = stream_reply(guard, agent, "Hello".into(), CancellationToken::new());
        drop(stream);

        let session = session.lock().await;
        assert_eq!(session.transcript().messages(), &[Message::user("Hello")]);
    }

    #[tokio::test]
    async fn test_empty_reply_appended_by_default() {
        let agent = Arc::new(ScriptedAgent::default());
        let session = fresh(EmptyReplyPolicy::Append);

        let guard = Arc::clone(&session).lock_owned().await;
        drain(stream_reply(guard, agent, "ping".into(), CancellationToken::new())).await;

        let session = session.lock().await;
        let last = session.transcript().messages().last().cloned().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "");
    }

    #[tokio::test]
    async fn test_empty_reply_suppressed_when_configured() {
        let agent = Arc::new(ScriptedAgent::default());
        let session = fresh(EmptyReplyPolicy::Suppress);

        let guard = Arc::clone(&session).lock_owned().await;
        let events = drain(stream_reply(guard, agent, "ping".into(), CancellationToken::new())).await;

        assert_eq!(
            events.last(),
            Some(&ChatEvent::Done {
                content: String::new(),
                appended: false
            })
        );
        let session = session.lock().await;
        assert_eq!(session.transcript().messages(), &[Message::user("ping")]);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_appends_nothing() {
        let agent = Arc::new(ScriptedAgent::default());
        agent.push_reply(&["partial"]).await;
        agent.fail_mid_stream.store(true, Ordering::SeqCst);
        let session = fresh(EmptyReplyPolicy::Append);

        let guard = Arc::clone(&session).lock_owned().await;
        let events = drain(stream_reply(guard, agent, "Hello".into(), CancellationToken::new())).await;

        assert!(matches!(events.last(), Some(ChatEvent::Error { .. })));
        let session = session.lock().await;
        assert_eq!(session.transcript().messages(), &[Message::user("Hello")]);
    }

    #[tokio::test]
    async fn test_cancelled_reply_discards_partial_output() {
        let agent = Arc::new(ScriptedAgent::default());
        agent.push_reply(&["one ", "two ", "three"]).await;
        let session = fresh(EmptyReplyPolicy::Append);
        let cancel = CancellationToken::new();

        let guard = Arc::clone(&session).lock_owned().await;
        let mut stream = stream_reply(guard, agent, "Hello".into(), cancel.clone());

        assert!(matches!(stream.next().await, Some(ChatEvent::StreamStart { .. })));
        assert!(matches!(stream.next().await, Some(ChatEvent::MessageDelta { .. })));
        cancel.cancel();
        let rest: Vec<ChatEvent> = stream.collect().await;

        assert!(matches!(rest.as_slice(), [ChatEvent::Cancelled { .. }]));
        let session = session.lock().await;
        assert_eq!(session.transcript().messages(), &[Message::user("Hello")]);
    }

    #[tokio::test]
    async fn test_reply_cancelled_while_queued_leaves_session_untouched() {
        let agent = Arc::new(ScriptedAgent::default());
        agent.push_reply(&["never"]).await;
        let session = fresh(EmptyReplyPolicy::Append);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let guard = Arc::clone(&session).lock_owned().await;
        let events = drain(stream_reply(guard, agent.clone(), "late".into(), cancel)).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ChatEvent::StreamStart { .. }));
        assert!(matches!(events[1], ChatEvent::Cancelled { .. }));
        assert!(session.lock().await.transcript().is_empty());
        assert!(agent.submitted.lock().await.is_empty());
    }
}
