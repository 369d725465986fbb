//! In-memory storage implementation
//!
//! Used by tests and by callers that do not want anything written to disk.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::MailStore;
use crate::models::{AiAnalysis, CredentialRecord, MessageId, NormalizedMessage};

/// In-memory implementation of MailStore
///
/// Uses HashMaps protected by RwLocks for thread-safe access.
pub struct InMemoryMailStore {
    messages: RwLock<HashMap<String, NormalizedMessage>>,
    analyses: RwLock<HashMap<String, AiAnalysis>>,
    credentials: RwLock<HashMap<String, CredentialRecord>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("In-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("In-memory store lock poisoned"))
}

impl InMemoryMailStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
            analyses: RwLock::new(HashMap::new()),
            credentials: RwLock::new(HashMap::new()),
        }
    }

    /// IDs of an owner's messages, newest first
    fn owner_ids_by_recency(&self, owner_email: &str) -> Result<Vec<String>> {
        let messages = read(&self.messages)?;
        let mut owned: Vec<&NormalizedMessage> = messages
            .values()
            .filter(|m| m.owner_email == owner_email)
            .collect();
        owned.sort_by(|a, b| {
            b.received_at
                .cmp(&a.received_at)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });
        Ok(owned.into_iter().map(|m| m.id.0.clone()).collect())
    }

    fn remove_messages(&self, ids: &[String]) -> Result<usize> {
        let mut messages = write(&self.messages)?;
        let mut analyses = write(&self.analyses)?;
        let mut removed = 0;
        for id in ids {
            if messages.remove(id).is_some() {
                removed += 1;
            }
            analyses.remove(id);
        }
        Ok(removed)
    }
}

impl Default for InMemoryMailStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MailStore for InMemoryMailStore {
    fn upsert_messages(&self, batch: &[NormalizedMessage]) -> Result<usize> {
        let mut messages = write(&self.messages)?;
        for message in batch {
            // Analyses are kept in their own map; never store one inline
            let stored = message.clone().with_analysis(None);
            messages.insert(message.id.0.clone(), stored);
        }
        Ok(batch.len())
    }

    fn list_recent(&self, owner_email: &str, limit: usize) -> Result<Vec<NormalizedMessage>> {
        let ids = self.owner_ids_by_recency(owner_email)?;
        let messages = read(&self.messages)?;
        let analyses = read(&self.analyses)?;

        Ok(ids
            .iter()
            .take(limit)
            .filter_map(|id| messages.get(id))
            .map(|m| m.clone().with_analysis(analyses.get(m.id.as_str()).cloned()))
            .collect())
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<NormalizedMessage>> {
        let messages = read(&self.messages)?;
        let analyses = read(&self.analyses)?;
        Ok(messages
            .get(id.as_str())
            .map(|m| m.clone().with_analysis(analyses.get(id.as_str()).cloned())))
    }

    fn count_messages(&self, owner_email: &str) -> Result<usize> {
        let messages = read(&self.messages)?;
        Ok(messages
            .values()
            .filter(|m| m.owner_email == owner_email)
            .count())
    }

    fn delete_messages_for_owner(&self, owner_email: &str) -> Result<usize> {
        let ids = self.owner_ids_by_recency(owner_email)?;
        self.remove_messages(&ids)
    }

    fn prune_messages(&self, owner_email: &str, keep: usize) -> Result<usize> {
        let ids = self.owner_ids_by_recency(owner_email)?;
        if ids.len() <= keep {
            return Ok(0);
        }
        self.remove_messages(&ids[keep..])
    }

    fn save_analysis(&self, id: &MessageId, analysis: &AiAnalysis) -> Result<()> {
        write(&self.analyses)?.insert(id.0.clone(), analysis.clone());
        Ok(())
    }

    fn get_analysis(&self, id: &MessageId) -> Result<Option<AiAnalysis>> {
        Ok(read(&self.analyses)?.get(id.as_str()).cloned())
    }

    fn get_credential(&self, owner_email: &str) -> Result<Option<CredentialRecord>> {
        Ok(read(&self.credentials)?.get(owner_email).cloned())
    }

    fn upsert_credential(&self, record: &CredentialRecord) -> Result<()> {
        write(&self.credentials)?.insert(record.owner_email.clone(), record.clone());
        Ok(())
    }

    fn delete_credential(&self, owner_email: &str) -> Result<bool> {
        Ok(write(&self.credentials)?.remove(owner_email).is_some())
    }
}
