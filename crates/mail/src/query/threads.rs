//! Thread query functions

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{NormalizedMessage, Priority, Thread, ThreadId};
use crate::storage::MailStore;
use crate::sync::CACHED_VIEW_LIMIT;

/// Summary information for displaying a thread in a list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Thread ID
    pub id: ThreadId,
    /// Subject of the latest message
    pub subject: String,
    /// Display name of the latest sender
    pub sender_name: String,
    /// AI summary when analyzed, otherwise the snippet
    pub preview: String,
    pub priority: Option<Priority>,
    pub urgency_score: Option<u8>,
    /// Number of messages in the thread
    pub message_count: usize,
    /// Timestamp of the most recent message
    pub last_message_at: DateTime<Utc>,
}

impl ThreadSummary {
    /// Summarize a thread from its latest message. None for an empty thread.
    pub fn from_thread(thread: &Thread) -> Option<Self> {
        let latest = thread.latest()?;
        let analysis = thread.analysis();

        Some(Self {
            id: thread.id.clone(),
            subject: latest.subject.clone(),
            sender_name: latest.sender_name.clone(),
            preview: analysis
                .map(|a| a.summary.clone())
                .unwrap_or_else(|| latest.snippet.clone()),
            priority: analysis.map(|a| a.priority),
            urgency_score: analysis.map(|a| a.urgency_score),
            message_count: thread.message_count(),
            last_message_at: latest.received_at,
        })
    }
}

/// Group messages by thread id
///
/// Messages inside a thread are ordered oldest first. Threads are ordered by
/// the latest message's urgency (unanalyzed counts as 0), then by the latest
/// message's time, newest first.
pub fn group_into_threads(messages: Vec<NormalizedMessage>) -> Vec<Thread> {
    let mut grouped: HashMap<ThreadId, Vec<NormalizedMessage>> = HashMap::new();
    for message in messages {
        grouped.entry(message.thread_id.clone()).or_default().push(message);
    }

    let mut threads: Vec<Thread> = grouped
        .into_iter()
        .map(|(id, messages)| Thread::new(id, messages))
        .collect();

    threads.sort_by(|a, b| {
        let urgency = |t: &Thread| t.analysis().map_or(0, |a| a.urgency_score);
        urgency(b)
            .cmp(&urgency(a))
            .then_with(|| b.last_message_at().cmp(&a.last_message_at()))
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
    threads
}

/// Cached threads for an account, most urgent first
pub fn list_threads(store: &dyn MailStore, owner_email: &str) -> Result<Vec<ThreadSummary>> {
    let messages = store.list_recent(owner_email, CACHED_VIEW_LIMIT)?;
    Ok(group_into_threads(messages)
        .iter()
        .filter_map(ThreadSummary::from_thread)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AiAnalysis, Category, MessageId, Sentiment};
    use crate::storage::InMemoryMailStore;
    use chrono::TimeZone;

    fn message(id: &str, thread: &str, minute: u32) -> NormalizedMessage {
        NormalizedMessage::builder(MessageId::new(id), ThreadId::new(thread))
            .owner_email("me@example.com")
            .sender(format!("{id}@example.com"), id.to_uppercase())
            .subject(format!("Subject {id}"))
            .snippet(format!("Snippet {id}"))
            .received_at(Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap())
            .build()
    }

    fn analysis(urgency: u8) -> AiAnalysis {
        AiAnalysis {
            summary: format!("Urgency {urgency}"),
            priority: if urgency > 70 { Priority::High } else { Priority::Low },
            urgency_score: urgency,
            category: Category::Work,
            action_items: vec![],
            sentiment: Sentiment::Neutral,
        }
    }

    #[test]
    fn test_messages_within_thread_are_chronological() {
        let threads = group_into_threads(vec![
            message("a", "t1", 0),
            message("b", "t1", 5),
            message("c", "t1", 2),
        ]);
        assert_eq!(threads.len(), 1);
        let ids: Vec<_> = threads[0].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_threads_ordered_by_urgency_then_recency() {
        let threads = group_into_threads(vec![
            message("old", "quiet", 1),
            message("new", "recent", 9),
            message("hot", "urgent", 0).with_analysis(Some(analysis(90))),
            message("mild", "mild", 3).with_analysis(Some(analysis(40))),
        ]);

        let ids: Vec<_> = threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["urgent", "mild", "recent", "quiet"]);
    }

    #[test]
    fn test_summary_uses_latest_message() {
        let thread = Thread::new(
            ThreadId::new("t1"),
            vec![
                message("first", "t1", 0).with_analysis(Some(analysis(95))),
                message("reply", "t1", 4),
            ],
        );

        let summary = ThreadSummary::from_thread(&thread).unwrap();
        assert_eq!(summary.subject, "Subject reply");
        assert_eq!(summary.sender_name, "REPLY");
        assert_eq!(summary.preview, "Snippet reply");
        assert_eq!(summary.urgency_score, None);
        assert_eq!(summary.message_count, 2);

        assert!(ThreadSummary::from_thread(&Thread::new(ThreadId::new("e"), vec![])).is_none());
    }

    #[test]
    fn test_list_threads_from_store() {
        let store = InMemoryMailStore::new();
        store
            .upsert_messages(&[message("a", "t1", 0), message("b", "t1", 1), message("c", "t2", 2)])
            .unwrap();
        store.save_analysis(&MessageId::new("b"), &analysis(80)).unwrap();

        let summaries = list_threads(&store, "me@example.com").unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id.as_str(), "t1");
        assert_eq!(summaries[0].preview, "Urgency 80");
        assert_eq!(summaries[0].priority, Some(Priority::High));
        assert!(list_threads(&store, "other@example.com").unwrap().is_empty());
    }
}
