//! Storage trait definitions

use crate::models::{AiAnalysis, CredentialRecord, MessageId, NormalizedMessage};
use anyhow::Result;

/// Trait for mail storage operations
///
/// Abstracts over the in-memory and SQLite backends. Message reads are always
/// scoped to an owner address; analyses live beside messages so that a
/// message upsert never drops them.
pub trait MailStore: Send + Sync {
    /// Insert or replace messages keyed by id, all-or-nothing.
    /// Returns the number of records written.
    fn upsert_messages(&self, messages: &[NormalizedMessage]) -> Result<usize>;

    /// Most recent messages for an owner, `received_at` descending, with any
    /// saved analysis attached
    fn list_recent(&self, owner_email: &str, limit: usize) -> Result<Vec<NormalizedMessage>>;

    /// Get a message by ID, with its analysis attached
    fn get_message(&self, id: &MessageId) -> Result<Option<NormalizedMessage>>;

    /// Count cached messages for an owner
    fn count_messages(&self, owner_email: &str) -> Result<usize>;

    /// Delete every cached message (and its analysis) for an owner
    fn delete_messages_for_owner(&self, owner_email: &str) -> Result<usize>;

    /// Keep only the `keep` most recent messages for an owner.
    /// Returns the number of messages removed.
    fn prune_messages(&self, owner_email: &str, keep: usize) -> Result<usize>;

    /// Save an analysis, replacing any previous one for the message
    fn save_analysis(&self, id: &MessageId, analysis: &AiAnalysis) -> Result<()>;

    fn get_analysis(&self, id: &MessageId) -> Result<Option<AiAnalysis>>;

    /// Get the credential record for an account
    fn get_credential(&self, owner_email: &str) -> Result<Option<CredentialRecord>>;

    /// Create or replace the credential record for an account
    fn upsert_credential(&self, record: &CredentialRecord) -> Result<()>;

    /// Delete the credential record for an account. Returns whether one existed.
    fn delete_credential(&self, owner_email: &str) -> Result<bool>;
}
