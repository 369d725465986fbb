//! Mail crate - Business logic for the AI inbox
//!
//! This crate provides platform-independent mail functionality including:
//! - Domain models (NormalizedMessage, Thread, AiAnalysis)
//! - Gmail API client, OAuth authentication and MIME decoding
//! - Three-tier credential store
//! - SQLite-backed message cache
//! - Sync orchestration (cached read, sync, search, send)
//! - AI triage and reply drafts
//! - Query API for UI consumption
//!
//! This crate has zero UI dependencies and is exported to Swift/Kotlin
//! through UniFFI (see `ffi`).

uniffi::setup_scaffolding!();

pub mod analysis;
pub mod config;
mod context;
pub mod credentials;
pub mod error;
pub mod ffi;
pub mod gmail;
pub mod models;
pub mod query;
pub mod storage;
pub mod sync;

pub use analysis::{AnalysisInput, Analyst, GeminiAnalyst, analyze_threads, draft_reply};
pub use crate::config::{GmailCredentials, InboxSettings};
pub use context::MailContext;
pub use credentials::{AuthStatus, CredentialStore, ResolvedCredential, Session, Tier};
pub use error::InboxError;
pub use gmail::{FlattenFailure, FlattenReport, GmailAuth, GmailClient, MailApi, flatten_thread};
pub use models::{
    AiAnalysis, Category, CredentialRecord, MessageId, NormalizedMessage, OAuthTokens, Priority,
    Sentiment, Thread, ThreadId,
};
pub use query::{ThreadSummary, group_into_threads, list_threads};
pub use storage::{InMemoryMailStore, MailStore, SqliteMailStore};
pub use sync::{Orchestrator, SyncOutcome, SyncStats};
