//! FFI-friendly type wrappers for UniFFI export
//!
//! These types convert internal Rust types to FFI-compatible versions:
//! - `DateTime<Utc>` → `i64` (Unix timestamp)
//! - `ThreadId`/`MessageId` → `String`
//! - Analysis enums → their wire names

use crate::credentials::AuthStatus;
use crate::error::InboxError;
use crate::models::{AiAnalysis, NormalizedMessage};
use crate::query::ThreadSummary;
use crate::sync::SyncOutcome;

// ============================================================================
// Error Types
// ============================================================================

/// FFI-friendly error type
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum MailError {
    /// No credential: the UI should show its login prompt
    #[error("Authentication required")]
    AuthRequired,

    #[error("Could not identify account: {message}")]
    Identity { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Analysis error: {message}")]
    Analysis { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl From<InboxError> for MailError {
    fn from(e: InboxError) -> Self {
        let message = e.to_string();
        match e {
            InboxError::Unauthenticated => MailError::AuthRequired,
            InboxError::IdentityResolutionFailed(_) => MailError::Identity { message },
            InboxError::SyncFailed(_) | InboxError::SearchFailed(_) | InboxError::SendFailed(_) => {
                MailError::Network { message }
            }
            InboxError::AnalysisFailed(_) => MailError::Analysis { message },
            InboxError::Persistence(_) => MailError::Database { message },
            InboxError::InvalidArgument(message) => MailError::InvalidArgument { message },
        }
    }
}

impl From<anyhow::Error> for MailError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<InboxError>() {
            Ok(inbox) => inbox.into(),
            Err(e) => MailError::Network {
                message: format!("{:#}", e),
            },
        }
    }
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAuthStatus {
    pub is_configured: bool,
    pub is_authenticated: bool,
    pub user_email: Option<String>,
}

impl From<AuthStatus> for FfiAuthStatus {
    fn from(s: AuthStatus) -> Self {
        Self {
            is_configured: s.is_configured,
            is_authenticated: s.is_authenticated,
            user_email: s.user_email,
        }
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// FFI-friendly AI analysis
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAnalysis {
    pub summary: String,
    /// HIGH, MEDIUM or LOW
    pub priority: String,
    pub urgency_score: u8,
    pub category: String,
    pub action_items: Vec<String>,
    pub sentiment: String,
}

impl From<AiAnalysis> for FfiAnalysis {
    fn from(a: AiAnalysis) -> Self {
        Self {
            summary: a.summary,
            priority: a.priority.as_str().to_string(),
            urgency_score: a.urgency_score,
            category: a.category.as_str().to_string(),
            action_items: a.action_items,
            sentiment: a.sentiment.as_str().to_string(),
        }
    }
}

/// FFI-friendly message representation
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMessage {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub sender_name: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub body: String,
    pub date: Option<String>,
    /// Unix timestamp (seconds since epoch)
    pub received_at: i64,
    pub analysis: Option<FfiAnalysis>,
}

impl From<NormalizedMessage> for FfiMessage {
    fn from(m: NormalizedMessage) -> Self {
        Self {
            id: m.id.0,
            thread_id: m.thread_id.0,
            sender: m.sender,
            sender_name: m.sender_name,
            from: m.from,
            subject: m.subject,
            snippet: m.snippet,
            body: m.body,
            date: m.date,
            received_at: m.received_at.timestamp(),
            analysis: m.analysis.map(FfiAnalysis::from),
        }
    }
}

// ============================================================================
// Thread Types
// ============================================================================

/// FFI-friendly thread summary for list views
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiThreadSummary {
    pub id: String,
    pub subject: String,
    pub sender_name: String,
    pub preview: String,
    pub priority: Option<String>,
    pub urgency_score: Option<u8>,
    pub message_count: u32,
    /// Unix timestamp (seconds since epoch)
    pub last_message_at: i64,
}

impl From<ThreadSummary> for FfiThreadSummary {
    fn from(t: ThreadSummary) -> Self {
        Self {
            id: t.id.0,
            subject: t.subject,
            sender_name: t.sender_name,
            preview: t.preview,
            priority: t.priority.map(|p| p.as_str().to_string()),
            urgency_score: t.urgency_score,
            message_count: t.message_count as u32,
            last_message_at: t.last_message_at.timestamp(),
        }
    }
}

// ============================================================================
// Sync Types
// ============================================================================

/// FFI-friendly sync result
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSyncResult {
    /// Refreshed cached view, newest first
    pub messages: Vec<FfiMessage>,
    pub threads_listed: u32,
    pub messages_stored: u32,
    /// Threads or messages that were skipped
    pub failures: u32,
    pub duration_ms: u64,
}

impl From<SyncOutcome> for FfiSyncResult {
    fn from(o: SyncOutcome) -> Self {
        Self {
            messages: o.messages.into_iter().map(FfiMessage::from).collect(),
            threads_listed: o.stats.threads_listed as u32,
            messages_stored: o.stats.messages_stored as u32,
            failures: o.stats.failures.len() as u32,
            duration_ms: o.stats.duration_ms,
        }
    }
}

// ============================================================================
// Log Callback
// ============================================================================

/// Log level for FFI callback
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<log::Level> for FfiLogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => FfiLogLevel::Error,
            log::Level::Warn => FfiLogLevel::Warn,
            log::Level::Info => FfiLogLevel::Info,
            log::Level::Debug => FfiLogLevel::Debug,
            log::Level::Trace => FfiLogLevel::Trace,
        }
    }
}

impl From<FfiLogLevel> for log::Level {
    fn from(level: FfiLogLevel) -> Self {
        match level {
            FfiLogLevel::Error => log::Level::Error,
            FfiLogLevel::Warn => log::Level::Warn,
            FfiLogLevel::Info => log::Level::Info,
            FfiLogLevel::Debug => log::Level::Debug,
            FfiLogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Callback interface for receiving log messages from Rust
///
/// Swift should implement this using os_log/Logger for unified logging.
#[uniffi::export(callback_interface)]
pub trait LogCallback: Send + Sync {
    /// Called when a log message is emitted
    ///
    /// # Arguments
    /// * `level` - The log level (error, warn, info, debug, trace)
    /// * `target` - The logging target (typically module path, e.g., "mail::sync")
    /// * `message` - The log message
    fn on_log(&self, level: FfiLogLevel, target: String, message: String);
}
