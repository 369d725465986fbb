//! Normalized message model produced by the thread flattener

use super::{AiAnalysis, ThreadId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single email message, flattened out of Gmail's MIME tree
///
/// `owner_email` partitions the cache: every read is filtered by it, so a
/// record is only ever visible to the account that synced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMessage {
    /// Gmail message ID (primary key)
    pub id: MessageId,
    /// Conversation this message belongs to
    pub thread_id: ThreadId,
    /// Account this record was synced for
    pub owner_email: String,
    /// Bare sender address
    pub sender: String,
    /// Sender display name (derived from the From header)
    pub sender_name: String,
    /// Raw From header value
    pub from: String,
    /// Subject line
    pub subject: String,
    /// Short preview text provided by Gmail
    pub snippet: String,
    /// Decoded body (HTML when available, otherwise plain text)
    pub body: String,
    /// Raw Date header value, if the message carried one
    pub date: Option<String>,
    /// Parsed receive time, used for ordering
    pub received_at: DateTime<Utc>,
    /// AI annotation, populated on reads when one has been saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AiAnalysis>,
}

impl NormalizedMessage {
    /// Create a new message builder
    pub fn builder(id: MessageId, thread_id: ThreadId) -> NormalizedMessageBuilder {
        NormalizedMessageBuilder::new(id, thread_id)
    }

    /// Attach (or replace) the AI annotation
    pub fn with_analysis(mut self, analysis: Option<AiAnalysis>) -> Self {
        self.analysis = analysis;
        self
    }
}

/// Builder for creating NormalizedMessage instances
pub struct NormalizedMessageBuilder {
    id: MessageId,
    thread_id: ThreadId,
    owner_email: String,
    sender: String,
    sender_name: String,
    from: String,
    subject: String,
    snippet: String,
    body: String,
    date: Option<String>,
    received_at: Option<DateTime<Utc>>,
}

impl NormalizedMessageBuilder {
    fn new(id: MessageId, thread_id: ThreadId) -> Self {
        Self {
            id,
            thread_id,
            owner_email: String::new(),
            sender: String::new(),
            sender_name: String::new(),
            from: String::new(),
            subject: String::new(),
            snippet: String::new(),
            body: String::new(),
            date: None,
            received_at: None,
        }
    }

    pub fn owner_email(mut self, owner_email: impl Into<String>) -> Self {
        self.owner_email = owner_email.into();
        self
    }

    pub fn sender(mut self, sender: impl Into<String>, sender_name: impl Into<String>) -> Self {
        self.sender = sender.into();
        self.sender_name = sender_name.into();
        self
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn date(mut self, date: Option<String>) -> Self {
        self.date = date;
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn build(self) -> NormalizedMessage {
        NormalizedMessage {
            id: self.id,
            thread_id: self.thread_id,
            owner_email: self.owner_email,
            sender: self.sender,
            sender_name: self.sender_name,
            from: self.from,
            subject: self.subject,
            snippet: self.snippet,
            body: self.body,
            date: self.date,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            analysis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builder_defaults_received_at() {
        let before = Utc::now();
        let msg = NormalizedMessage::builder(MessageId::new("m1"), ThreadId::new("t1")).build();
        assert!(msg.received_at >= before);
        assert!(msg.analysis.is_none());
    }

    #[test]
    fn test_serializes_camel_case() {
        let msg = NormalizedMessage::builder(MessageId::new("m1"), ThreadId::new("t1"))
            .owner_email("me@example.com")
            .sender("a@example.com", "a")
            .received_at(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
            .build();

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["threadId"], "t1");
        assert_eq!(json["ownerEmail"], "me@example.com");
        assert_eq!(json["senderName"], "a");
        assert!(json.get("analysis").is_none());
    }
}
