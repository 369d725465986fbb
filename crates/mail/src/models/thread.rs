//! Thread model: a derived grouping of messages sharing a conversation ID

use super::{AiAnalysis, NormalizedMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a thread (Gmail thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
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

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation containing one or more messages
///
/// Threads are never persisted; they are rebuilt from cached messages.
/// Messages are kept in `received_at` ascending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub messages: Vec<NormalizedMessage>,
}

impl Thread {
    /// Build a thread, ordering its messages chronologically
    pub fn new(id: ThreadId, mut messages: Vec<NormalizedMessage>) -> Self {
        messages.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        Self { id, messages }
    }

    /// The most recent message; drives the thread's summary and priority
    pub fn latest(&self) -> Option<&NormalizedMessage> {
        self.messages.last()
    }

    /// Analysis of the latest message, propagated to the whole thread
    pub fn analysis(&self) -> Option<&AiAnalysis> {
        self.latest().and_then(|m| m.analysis.as_ref())
    }

    /// Timestamp of the most recent message
    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.latest().map(|m| m.received_at)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageId;
    use chrono::TimeZone;

    fn at(id: &str, hour: u32, minute: u32) -> NormalizedMessage {
        NormalizedMessage::builder(MessageId::new(id), ThreadId::new("t1"))
            .received_at(Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap())
            .build()
    }

    #[test]
    fn test_messages_sorted_ascending() {
        let thread = Thread::new(
            ThreadId::new("t1"),
            vec![at("A", 10, 0), at("B", 10, 5), at("C", 10, 2)],
        );

        let order: Vec<&str> = thread.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(order, vec!["A", "C", "B"]);
        assert_eq!(thread.latest().unwrap().id.as_str(), "B");
        assert_eq!(thread.message_count(), 3);
    }

    #[test]
    fn test_empty_thread_has_no_latest() {
        let thread = Thread::new(ThreadId::new("t1"), Vec::new());
        assert!(thread.latest().is_none());
        assert!(thread.analysis().is_none());
        assert!(thread.last_message_at().is_none());
    }
}
