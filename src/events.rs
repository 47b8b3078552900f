//! Streaming events emitted while an assistant reply is in flight.
//!
//! A reply stream is a finite sequence of [`ChatEvent`]s that always begins
//! with [`ChatEvent::StreamStart`] and ends with exactly one of
//! [`ChatEvent::Done`], [`ChatEvent::Error`] or [`ChatEvent::Cancelled`].
//!
//! # Example
//!
//! ```rust
//! use chat_threads::events::{ChatEvent, sse_event};
//!
//! let event = ChatEvent::MessageDelta {
//!     text: "Hel".to_string(),
//!     content: "Hel".to_string(),
//! };
//! let sse = sse_event(&event);
//! assert!(sse.starts_with("event: message.delta\n"));
//! ```

use serde::{Deserialize, Serialize};

/// Events produced by a session while it streams an assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// The user message was accepted and the agent stream is opening.
    #[serde(rename = "stream.start")]
    StreamStart {
        /// Unique identifier for this request/response pair.
        request_id: String,
        /// Thread the reply belongs to.
        thread_id: String,
    },

    /// One fragment arrived from the agent.
    #[serde(rename = "message.delta")]
    MessageDelta {
        /// The fragment exactly as received.
        text: String,
        /// Concatenation of every fragment received so far.
        content: String,
    },

    /// The agent failed. No assistant message was appended.
    #[serde(rename = "error")]
    Error {
        /// Human readable error message.
        message: String,
        /// Optional error code for programmatic handling.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// The reply was abandoned; partial output was discarded.
    #[serde(rename = "cancelled")]
    Cancelled {
        /// Identifier of the abandoned request.
        request_id: String,
    },

    /// The reply completed.
    #[serde(rename = "done")]
    Done {
        /// Final concatenated reply.
        content: String,
        /// Whether an assistant message was appended to the transcript.
        appended: bool,
    },
}

/// Convert a [`ChatEvent`] to an SSE-formatted string.
///
/// The output carries an `event:` line for `EventSource` listeners and a
/// `data:` line with the JSON payload, terminated by a blank line.
pub fn sse_event(evt: &ChatEvent) -> String {
    let json = serde_json::to_string(evt).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "data": { "message": e.to_string() } }).to_string()
    });

    let event_name = event_name(evt);

    format!("event: {event_name}\ndata: {json}\n\n")
}

/// Get the SSE event name for a [`ChatEvent`].
pub fn event_name(evt: &ChatEvent) -> &'static str {
    match evt {
        ChatEvent::StreamStart { .. } => "stream.start",
        ChatEvent::MessageDelta { .. } => "message.delta",
        ChatEvent::Error { .. } => "error",
        ChatEvent::Cancelled { .. } => "cancelled",
        ChatEvent::Done { .. } => "done",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_delta_serialization() {
        let event = ChatEvent::MessageDelta {
            text: "there".to_string(),
            content: "Hi there".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("message.delta"));
        assert!(json.contains("Hi there"));
    }

    #[test]
    fn test_sse_event_format() {
        let event = ChatEvent::Done {
            content: String::new(),
            appended: true,
        };
        let sse = sse_event(&event);
        assert!(sse.starts_with("event: done\n"));
        assert!(sse.contains("data: "));
        assert!(sse.ends_with("\n\n"));
    }

    #[test]
    fn test_error_code_omitted_when_absent() {
        let event = ChatEvent::Error {
            message: "boom".to_string(),
            code: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("code"));
    }
}
