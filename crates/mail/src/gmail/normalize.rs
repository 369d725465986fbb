//! Thread flattening
//!
//! Converts Gmail's nested thread/message/part representation into one
//! `NormalizedMessage` per message.

use chrono::{DateTime, Utc};
use log::warn;

use super::api::{GmailMessage, GmailThread, MessagePart};
use super::mime::decode_base64url;
use crate::models::{MessageId, NormalizedMessage, ThreadId};

/// Subject used when a message carries no Subject header
pub const NO_SUBJECT: &str = "(no subject)";

/// From value used when a message carries no From header
pub const UNKNOWN_SENDER: &str = "(unknown)";

/// Part trees nested deeper than this are not searched
const MAX_PART_DEPTH: usize = 64;

/// A message or thread that could not be turned into a record
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenFailure {
    pub thread_id: String,
    pub message_id: Option<String>,
    pub reason: String,
}

/// Per-item outcome of flattening a batch of threads
///
/// Failures never abort the batch; they are collected here so the caller can
/// inspect them.
#[derive(Debug, Clone, Default)]
pub struct FlattenReport {
    pub messages: Vec<NormalizedMessage>,
    pub failures: Vec<FlattenFailure>,
}

impl FlattenReport {
    /// Record a thread that could not be fetched at all
    pub fn thread_failed(&mut self, thread_id: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(FlattenFailure {
            thread_id: thread_id.into(),
            message_id: None,
            reason: reason.into(),
        });
    }

    /// Merge another report into this one, keeping order
    pub fn extend(&mut self, other: FlattenReport) {
        self.messages.extend(other.messages);
        self.failures.extend(other.failures);
    }
}

/// Flatten every message of a thread, tagging each record with `owner_email`
pub fn flatten_thread(thread: &GmailThread, owner_email: &str) -> FlattenReport {
    let mut report = FlattenReport::default();

    for message in &thread.messages {
        match normalize_message(message, &thread.id, owner_email) {
            Some(normalized) => report.messages.push(normalized),
            None => {
                warn!("Skipping message without an id in thread {}", thread.id);
                report.failures.push(FlattenFailure {
                    thread_id: thread.id.clone(),
                    message_id: None,
                    reason: "Message has no id".to_string(),
                });
            }
        }
    }

    report
}

/// Normalize a single Gmail message. Returns `None` when the message has no id.
fn normalize_message(
    message: &GmailMessage,
    thread_id: &str,
    owner_email: &str,
) -> Option<NormalizedMessage> {
    let id = message.id.as_deref().filter(|id| !id.is_empty())?;
    let thread_id = message.thread_id.as_deref().unwrap_or(thread_id);
    let payload = message.payload.as_ref();
    let snippet = message.snippet.clone().unwrap_or_default();

    let subject = extract_header(payload, "Subject").unwrap_or_else(|| NO_SUBJECT.to_string());
    let from = extract_header(payload, "From").unwrap_or_else(|| UNKNOWN_SENDER.to_string());
    let (sender, sender_name) = parse_sender(&from);

    let date = extract_header(payload, "Date");
    let received_at = date.as_deref().and_then(parse_date).unwrap_or_else(Utc::now);

    let body = select_body(payload, &snippet);

    Some(
        NormalizedMessage::builder(MessageId::new(id), ThreadId::new(thread_id))
            .owner_email(owner_email)
            .sender(sender, sender_name)
            .from(from)
            .subject(subject)
            .snippet(snippet)
            .body(body)
            .date(date)
            .received_at(received_at)
            .build(),
    )
}

/// Extract a header value by name, case-insensitively
fn extract_header(payload: Option<&MessagePart>, name: &str) -> Option<String> {
    payload?.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Split a From header into `(address, display name)`.
///
/// `"Jane Doe" <jane@example.com>` yields the bracketed address and the
/// unquoted name; `<jane@example.com>` with no name and a bare
/// `jane@example.com` both yield the address and its local part; anything
/// else is returned as both fields.
pub fn parse_sender(from: &str) -> (String, String) {
    let value = from.trim();

    if let Some(close) = value.rfind('>')
        && let Some(open) = value[..close].rfind('<')
    {
        let address = value[open + 1..close].trim().to_string();
        let name = strip_quotes(value[..open].trim());
        let name = if name.is_empty() {
            local_part(&address).to_string()
        } else {
            name.to_string()
        };
        return (address, name);
    }

    if value.contains('@') {
        return (value.to_string(), local_part(value).to_string());
    }

    (value.to_string(), value.to_string())
}

fn strip_quotes(s: &str) -> &str {
    let s = s.strip_prefix('"').unwrap_or(s);
    s.strip_suffix('"').unwrap_or(s)
}

fn local_part(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}

/// Parse a Date header. Accepts RFC 2822 (with an optional trailing comment
/// such as `(UTC)`) and RFC 3339.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    let without_comment = match trimmed.rfind('(') {
        Some(i) if trimmed.ends_with(')') => trimmed[..i].trim_end(),
        _ => trimmed,
    };

    DateTime::parse_from_rfc2822(without_comment)
        .or_else(|_| DateTime::parse_from_rfc3339(without_comment))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

/// Pick the body representation: HTML part, plain-text part, single
/// top-level body, then the snippet.
fn select_body(payload: Option<&MessagePart>, snippet: &str) -> String {
    let Some(payload) = payload else {
        return snippet.to_string();
    };

    if let Some(parts) = payload.parts.as_deref()
        && !parts.is_empty()
    {
        if let Some(data) = find_part_data(parts, "text/html") {
            return decode_base64url(data);
        }
        if let Some(data) = find_part_data(parts, "text/plain") {
            return decode_base64url(data);
        }
    }

    if let Some(data) = payload.inline_data() {
        return decode_base64url(data);
    }

    snippet.to_string()
}

/// Depth-first search of a part tree for the first `mime_type` leaf with
/// inline data. Multipart containers may nest to any depth up to
/// `MAX_PART_DEPTH`.
fn find_part_data<'a>(parts: &'a [MessagePart], mime_type: &str) -> Option<&'a str> {
    let mut stack: Vec<(&MessagePart, usize)> = parts.iter().rev().map(|p| (p, 1)).collect();

    while let Some((part, depth)) = stack.pop() {
        if part.is_mime_type(mime_type)
            && let Some(data) = part.inline_data()
        {
            return Some(data);
        }

        if let Some(children) = part.parts.as_deref() {
            if depth >= MAX_PART_DEPTH {
                warn!("Part tree deeper than {} levels, ignoring nested parts", MAX_PART_DEPTH);
                continue;
            }
            stack.extend(children.iter().rev().map(|c| (c, depth + 1)));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::{Header, MessageBody};
    use crate::gmail::mime::encode_base64url;
    use chrono::TimeZone;

    fn headers(pairs: &[(&str, &str)]) -> Option<Vec<Header>> {
        Some(
            pairs
                .iter()
                .map(|(n, v)| Header {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
        )
    }

    fn leaf(mime_type: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime_type.to_string()),
            body: Some(MessageBody {
                size: Some(text.len() as u32),
                data: Some(encode_base64url(text)),
                attachment_id: None,
            }),
            ..Default::default()
        }
    }

    fn container(mime_type: &str, parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: Some(mime_type.to_string()),
            body: Some(MessageBody::default()),
            parts: Some(parts),
            ..Default::default()
        }
    }

    fn message(id: &str, date: &str, payload: MessagePart) -> GmailMessage {
        let mut payload = payload;
        payload.headers = headers(&[
            ("Subject", "Status"),
            ("From", "Ops <ops@example.com>"),
            ("Date", date),
        ]);
        GmailMessage {
            id: Some(id.to_string()),
            thread_id: Some("t1".to_string()),
            snippet: Some(format!("snippet {}", id)),
            payload: Some(payload),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_sender_quoted_name() {
        let (sender, name) = parse_sender("\"Jane Doe\" <jane@x.com>");
        assert_eq!(sender, "jane@x.com");
        assert_eq!(name, "Jane Doe");
    }

    #[test]
    fn test_parse_sender_unquoted_name() {
        let (sender, name) = parse_sender("Sarah Jenkins (CEO) <boss@techcorp.com>");
        assert_eq!(sender, "boss@techcorp.com");
        assert_eq!(name, "Sarah Jenkins (CEO)");
    }

    #[test]
    fn test_parse_sender_bare_address() {
        let (sender, name) = parse_sender("alerts@bank.example");
        assert_eq!(sender, "alerts@bank.example");
        assert_eq!(name, "alerts");
    }

    #[test]
    fn test_parse_sender_brackets_without_name() {
        let (sender, name) = parse_sender("<noreply@example.com>");
        assert_eq!(sender, "noreply@example.com");
        assert_eq!(name, "noreply");
    }

    #[test]
    fn test_parse_sender_placeholder() {
        let (sender, name) = parse_sender(UNKNOWN_SENDER);
        assert_eq!(sender, UNKNOWN_SENDER);
        assert_eq!(name, UNKNOWN_SENDER);
    }

    #[test]
    fn test_parse_date_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_date("Fri, 1 Mar 2024 10:00:00 +0000"), Some(expected));
        assert_eq!(parse_date("Fri, 1 Mar 2024 11:00:00 +0100 (CET)"), Some(expected));
        assert_eq!(parse_date("2024-03-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_date("yesterday-ish"), None);
    }

    #[test]
    fn test_prefers_html_over_plain() {
        let payload = container(
            "multipart/alternative",
            vec![leaf("text/plain", "plain"), leaf("text/html", "<b>rich</b>")],
        );
        let body = select_body(Some(&payload), "snip");
        assert_eq!(body, "<b>rich</b>");
    }

    #[test]
    fn test_finds_plain_nested_two_levels() {
        let payload = container(
            "multipart/mixed",
            vec![
                container("multipart/alternative", vec![leaf("text/plain", "deep text")]),
                MessagePart {
                    mime_type: Some("application/pdf".to_string()),
                    filename: Some("report.pdf".to_string()),
                    body: Some(MessageBody {
                        size: Some(1024),
                        data: None,
                        attachment_id: Some("att-1".to_string()),
                    }),
                    ..Default::default()
                },
            ],
        );
        assert_eq!(select_body(Some(&payload), "snip"), "deep text");
    }

    #[test]
    fn test_single_body_without_parts() {
        let payload = leaf("text/plain", "just text");
        assert_eq!(select_body(Some(&payload), "snip"), "just text");
    }

    #[test]
    fn test_parts_without_text_fall_back_to_top_level_body() {
        let mut payload = container("multipart/mixed", vec![container("multipart/related", vec![])]);
        payload.body = Some(MessageBody {
            size: Some(3),
            data: Some(encode_base64url("top")),
            attachment_id: None,
        });
        assert_eq!(select_body(Some(&payload), "snip"), "top");
    }

    #[test]
    fn test_falls_back_to_snippet() {
        let payload = container("multipart/mixed", vec![]);
        assert_eq!(select_body(Some(&payload), "the snippet"), "the snippet");
        assert_eq!(select_body(None, "the snippet"), "the snippet");
    }

    #[test]
    fn test_depth_guard_stops_runaway_nesting() {
        let mut part = leaf("text/plain", "buried");
        for _ in 0..(MAX_PART_DEPTH + 5) {
            part = container("multipart/mixed", vec![part]);
        }
        let payload = container("multipart/mixed", vec![part]);
        assert_eq!(select_body(Some(&payload), "snip"), "snip");
    }

    #[test]
    fn test_flatten_thread_defaults_and_owner() {
        let thread = GmailThread {
            id: "t1".to_string(),
            messages: vec![GmailMessage {
                id: Some("m1".to_string()),
                thread_id: None,
                snippet: Some("preview".to_string()),
                payload: Some(MessagePart {
                    headers: headers(&[("x-mailer", "test")]),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };

        let before = Utc::now();
        let report = flatten_thread(&thread, "me@example.com");
        assert!(report.failures.is_empty());
        let msg = &report.messages[0];
        assert_eq!(msg.thread_id.as_str(), "t1");
        assert_eq!(msg.owner_email, "me@example.com");
        assert_eq!(msg.subject, NO_SUBJECT);
        assert_eq!(msg.sender, UNKNOWN_SENDER);
        assert_eq!(msg.sender_name, UNKNOWN_SENDER);
        assert_eq!(msg.body, "preview");
        assert!(msg.date.is_none());
        assert!(msg.received_at >= before);
    }

    #[test]
    fn test_flatten_thread_orders_by_date() {
        let thread = GmailThread {
            id: "t1".to_string(),
            messages: vec![
                message("A", "Fri, 1 Mar 2024 10:00:00 +0000", leaf("text/plain", "a")),
                message("B", "Fri, 1 Mar 2024 10:05:00 +0000", leaf("text/plain", "b")),
                message("C", "Fri, 1 Mar 2024 10:02:00 +0000", leaf("text/plain", "c")),
            ],
        };

        let mut messages = flatten_thread(&thread, "me@example.com").messages;
        messages.sort_by_key(|m| m.received_at);
        let order: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(order, vec!["A", "C", "B"]);
        assert_eq!(messages[0].sender, "ops@example.com");
        assert_eq!(messages[0].sender_name, "Ops");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let payload = MessagePart {
            headers: headers(&[("SUBJECT", "Loud"), ("from", "a@b.com")]),
            ..Default::default()
        };
        assert_eq!(extract_header(Some(&payload), "Subject"), Some("Loud".to_string()));
        assert_eq!(extract_header(Some(&payload), "From"), Some("a@b.com".to_string()));
        assert_eq!(extract_header(Some(&payload), "Date"), None);
    }

    #[test]
    fn test_message_without_id_is_reported() {
        let thread = GmailThread {
            id: "t1".to_string(),
            messages: vec![
                GmailMessage::default(),
                message("m2", "Fri, 1 Mar 2024 10:00:00 +0000", leaf("text/plain", "ok")),
            ],
        };

        let report = flatten_thread(&thread, "me@example.com");
        assert_eq!(report.messages.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].thread_id, "t1");
    }
}
