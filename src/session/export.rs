//! Plain-text transcript export.

use std::fmt::Write as _;

use super::Message;

/// File name offered for downloaded transcripts.
pub const EXPORT_FILE_NAME: &str = "chat_history.txt";

/// Render `messages` as `"<Role>: <content>\n\n"` blocks, in order.
#[must_use]
pub fn export_as_text(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let _ = write!(out, "{}: {}\n\n", capitalize(msg.role.as_str()), msg.content);
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
