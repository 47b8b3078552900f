//! Chat sessions: thread registry, active transcript and reply streaming.
//!
//! Each browser session owns one [`ChatSession`]: the threads it knows about
//! and the transcript of the thread currently on screen. The durable history
//! of every thread lives in the external agent; the transcript here is a
//! projection rebuilt whenever another thread is selected.
//!
//! # Architecture
//!
//! - [`ThreadRegistry`]: known threads with permanent `"Chat N"` labels
//! - [`Transcript`]: append-only messages of the active thread
//! - [`load_conversation`]: agent state to transcript messages
//! - [`export_as_text`]: transcript to a plain-text document
//! - [`ChatSession`] and [`stream_reply`]: the interaction loop
//! - [`SessionStore`]: every live session in the process
//!
//! # Example
//!
//! ```rust
//! use chat_threads::session::{ChatSession, EmptyReplyPolicy, Message, export_as_text};
//!
//! let mut chat = ChatSession::with_persisted(Vec::new(), EmptyReplyPolicy::Append);
//! chat.append(Message::user("hi"));
//! chat.complete_reply("yo".to_string());
//!
//! assert_eq!(chat.export_text(), "User: hi\n\nAssistant: yo\n\n");
//! assert_eq!(export_as_text(&[]), "");
//! ```

mod chat;
mod export;
mod loader;
mod store;
mod thread;
mod transcript;

pub use chat::{
    ChatSession, EmptyReplyPolicy, ReplyBuffer, ReplyStream, accept_input, stream_reply,
};
pub use export::{EXPORT_FILE_NAME, export_as_text};
pub use loader::load_conversation;
pub use store::{SessionHandle, SessionStore};
pub use thread::{Thread, ThreadId, ThreadRegistry};
pub use transcript::{Message, Role, Transcript};
