//! Thread identifiers and the per-session thread registry.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, stable identifier of one conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Generate a fresh, never-reused id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A registered thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    /// Thread identifier.
    pub id: ThreadId,
    /// Display label, fixed at first registration.
    pub label: String,
    /// Zero-based position in creation order.
    #[serde(skip)]
    pub created_order: usize,
}

/// Known threads of one session, in creation order.
///
/// Registration is idempotent and labels are permanent: an id keeps the
/// `"Chat N"` label it received the first time it was seen.
#[derive(Debug, Clone, Default)]
pub struct ThreadRegistry {
    threads: Vec<Thread>,
    index: HashMap<ThreadId, usize>,
}

impl ThreadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from ids in creation order. Repeated ids keep their
    /// first position.
    pub fn seeded(ids: impl IntoIterator<Item = ThreadId>) -> Self {
        let mut registry = Self::new();
        for id in ids {
            registry.register(id);
        }
        registry
    }

    /// Register `id` if unseen. Returns `true` when a new thread was added.
    pub fn register(&mut self, id: ThreadId) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        let created_order = self.threads.len();
        let label = format!("Chat {}", created_order + 1);
        self.index.insert(id.clone(), created_order);
        self.threads.push(Thread {
            id,
            label,
            created_order,
        });
        true
    }

    /// Threads for display, most recently created first.
    pub fn list(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter().rev()
    }

    /// Label of `id`, falling back to the id itself if unregistered.
    #[must_use]
    pub fn label_of(&self, id: &ThreadId) -> String {
        self.index
            .get(id)
            .map_or_else(|| id.to_string(), |&i| self.threads[i].label.clone())
    }

    #[must_use]
    pub fn contains(&self, id: &ThreadId) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
