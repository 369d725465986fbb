//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 authorization code flow and token refresh
//! - The `MailApi` seam and its HTTP implementation
//! - base64url/MIME helpers
//! - Thread flattening into normalized records

mod auth;
mod client;
pub mod mime;
mod normalize;

use anyhow::Result;

pub use auth::GmailAuth;
pub use client::GmailClient;
pub use normalize::{FlattenFailure, FlattenReport, flatten_thread, parse_sender};

use crate::models::ThreadId;

/// Remote mail operations consumed by the sync orchestrator
///
/// `GmailClient` talks to the Gmail REST API; tests substitute an in-process
/// fake. Every call acts on the account whose credential is currently loaded.
pub trait MailApi: Send + Sync {
    /// List the most recent threads, optionally filtered by a Gmail query
    fn list_threads(&self, query: Option<&str>, max_results: u32) -> Result<Vec<api::ThreadRef>>;

    /// Fetch a full thread (format=full) with every message and part
    fn get_thread(&self, id: &ThreadId) -> Result<api::GmailThread>;

    /// Look up the authenticated account ("who am I")
    fn get_profile(&self) -> Result<api::Profile>;

    /// Send a base64url-encoded RFC 5322 message, optionally into a thread
    fn send_message(&self, raw: &str, thread_id: Option<&ThreadId>) -> Result<api::SentMessage>;
}

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing threads
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListThreadsResponse {
        pub threads: Option<Vec<ThreadRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a thread returned by a list call
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadRef {
        pub id: String,
        pub snippet: Option<String>,
        pub history_id: Option<String>,
    }

    impl ThreadRef {
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                snippet: None,
                history_id: None,
            }
        }
    }

    /// Full thread from Gmail API
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailThread {
        pub id: String,
        #[serde(default)]
        pub messages: Vec<GmailMessage>,
    }

    /// Full message from Gmail API
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: Option<String>,
        pub thread_id: Option<String>,
        pub label_ids: Option<Vec<String>>,
        pub snippet: Option<String>,
        pub internal_date: Option<String>,
        pub payload: Option<MessagePart>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Part body; `data` is base64url encoded when inline
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
        pub attachment_id: Option<String>,
    }

    /// One node of the MIME tree. The message payload is the root part.
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    impl MessagePart {
        /// Inline body data, if present and non-empty
        pub fn inline_data(&self) -> Option<&str> {
            self.body
                .as_ref()
                .and_then(|b| b.data.as_deref())
                .filter(|d| !d.is_empty())
        }

        /// Whether this part's MIME type matches `mime_type`, ignoring case
        /// and any parameters
        pub fn is_mime_type(&self, mime_type: &str) -> bool {
            self.mime_type.as_deref().is_some_and(|m| {
                m.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .eq_ignore_ascii_case(mime_type)
            })
        }

        pub fn has_parts(&self) -> bool {
            self.parts.as_ref().is_some_and(|p| !p.is_empty())
        }
    }

    /// Response from the profile endpoint
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Profile {
        pub email_address: String,
        pub messages_total: Option<u64>,
        pub threads_total: Option<u64>,
        pub history_id: Option<String>,
    }

    /// Request body for messages.send
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SendMessageRequest<'a> {
        pub raw: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub thread_id: Option<&'a str>,
    }

    /// Response from messages.send
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SentMessage {
        pub id: String,
        pub thread_id: Option<String>,
    }
}

#[cfg(test)]
mod tests {
    use super::api::*;

    #[test]
    fn test_parse_thread_response() {
        let json = r#"{
            "id": "t1",
            "messages": [{
                "id": "m1",
                "threadId": "t1",
                "snippet": "Hello there",
                "payload": {
                    "mimeType": "multipart/alternative",
                    "headers": [{"name": "Subject", "value": "Hi"}],
                    "body": {"size": 0},
                    "parts": [
                        {"partId": "0", "mimeType": "text/plain", "body": {"size": 5, "data": "aGVsbG8"}}
                    ]
                }
            }]
        }"#;

        let thread: GmailThread = serde_json::from_str(json).unwrap();
        assert_eq!(thread.messages.len(), 1);
        let payload = thread.messages[0].payload.as_ref().unwrap();
        assert!(payload.has_parts());
        assert!(payload.parts.as_ref().unwrap()[0].is_mime_type("text/plain"));
        assert_eq!(payload.parts.as_ref().unwrap()[0].inline_data(), Some("aGVsbG8"));
        assert_eq!(payload.inline_data(), None);
    }

    #[test]
    fn test_thread_without_messages() {
        let thread: GmailThread = serde_json::from_str(r#"{"id":"t9"}"#).unwrap();
        assert!(thread.messages.is_empty());
    }

    #[test]
    fn test_mime_type_ignores_params_and_case() {
        let part = MessagePart {
            mime_type: Some("Text/HTML; charset=UTF-8".to_string()),
            ..Default::default()
        };
        assert!(part.is_mime_type("text/html"));
        assert!(!part.is_mime_type("text/plain"));
    }

    #[test]
    fn test_send_request_omits_missing_thread() {
        let body = serde_json::to_value(SendMessageRequest {
            raw: "abc",
            thread_id: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"raw": "abc"}));

        let body = serde_json::to_value(SendMessageRequest {
            raw: "abc",
            thread_id: Some("t1"),
        })
        .unwrap();
        assert_eq!(body["threadId"], "t1");
    }
}
