//! Inbox sync orchestration

use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

use super::{CACHED_VIEW_LIMIT, clamp_thread_count};
use crate::credentials::{CredentialStore, Session};
use crate::error::InboxError;
use crate::gmail::api::ThreadRef;
use crate::gmail::{FlattenFailure, FlattenReport, MailApi, flatten_thread, mime};
use crate::models::{NormalizedMessage, ThreadId};
use crate::storage::MailStore;

/// Statistics from a sync operation
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Number of threads returned by the list call
    pub threads_listed: usize,
    /// Number of messages upserted
    pub messages_stored: usize,
    /// Number of cached messages removed by the retention policy
    pub messages_pruned: usize,
    /// Threads or messages that could not be fetched or decoded
    pub failures: Vec<FlattenFailure>,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

/// Result of a sync: the refreshed cached view plus what happened
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Up to 50 records for the account, newest first
    pub messages: Vec<NormalizedMessage>,
    pub stats: SyncStats,
}

/// Coordinates credentials, the remote API and the local cache
pub struct Orchestrator {
    api: Arc<dyn MailApi>,
    store: Arc<dyn MailStore>,
    credentials: Arc<CredentialStore>,
    retention: Option<usize>,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn MailApi>,
        store: Arc<dyn MailStore>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            api,
            store,
            credentials,
            retention: None,
        }
    }

    /// Keep at most `keep` cached messages per account after each sync.
    /// Never below the size of the cached view.
    pub fn with_retention(mut self, keep: Option<usize>) -> Self {
        self.retention = keep.map(|k| k.max(CACHED_VIEW_LIMIT));
        self
    }

    pub fn api(&self) -> &dyn MailApi {
        self.api.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn MailStore> {
        &self.store
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Require a credential and resolve the account it belongs to
    pub fn principal(&self, session: &mut Session) -> Result<String, InboxError> {
        self.credentials.resolve(session)?;
        self.credentials.principal(session, self.api.as_ref())
    }

    /// Cached messages for the session's account, newest first, at most 50.
    /// Never calls the remote API for mail; a store failure yields an empty
    /// list.
    pub fn cached_inbox(&self, session: &mut Session) -> Result<Vec<NormalizedMessage>, InboxError> {
        let principal = self.principal(session)?;

        match self.store.list_recent(&principal, CACHED_VIEW_LIMIT) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                warn!("Failed to read cached inbox for {}: {:#}", principal, e);
                Ok(Vec::new())
            }
        }
    }

    /// Fetch the most recent threads, cache every message and return the
    /// refreshed view.
    ///
    /// `max` is clamped to 1..=20 (default 10). A thread that fails to fetch
    /// is recorded in the stats and skipped; a failed list call fails the
    /// sync.
    pub fn sync_inbox(
        &self,
        session: &mut Session,
        max: Option<u32>,
    ) -> Result<SyncOutcome, InboxError> {
        let start = Instant::now();
        let principal = self.principal(session)?;
        let max = clamp_thread_count(max);

        // 1. List thread IDs
        let refs = self
            .api
            .list_threads(None, max)
            .map_err(|e| remote_error(e, InboxError::SyncFailed))?;

        // 2. Fetch and flatten
        let report = fetch_threads(self.api.as_ref(), &refs, &principal);

        // 3. Upsert in one transaction
        let messages_stored = self
            .store
            .upsert_messages(&report.messages)
            .map_err(InboxError::Persistence)?;

        // 4. Retention
        let messages_pruned = match self.retention {
            Some(keep) => self.store.prune_messages(&principal, keep).unwrap_or_else(|e| {
                warn!("Failed to apply cache retention for {}: {:#}", principal, e);
                0
            }),
            None => 0,
        };

        // 5. Read back the view
        let messages = match self.store.list_recent(&principal, CACHED_VIEW_LIMIT) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Read-back after sync failed, returning fetched records: {:#}", e);
                newest_first(report.messages, CACHED_VIEW_LIMIT)
            }
        };

        let stats = SyncStats {
            threads_listed: refs.len(),
            messages_stored,
            messages_pruned,
            failures: report.failures,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Synced {} threads / {} messages for {} ({} failures, {}ms)",
            stats.threads_listed,
            stats.messages_stored,
            principal,
            stats.failures.len(),
            stats.duration_ms
        );

        Ok(SyncOutcome { messages, stats })
    }

    /// Search the remote mailbox. Results are returned directly and never
    /// cached.
    pub fn search_inbox(
        &self,
        session: &mut Session,
        query: &str,
        max: Option<u32>,
    ) -> Result<Vec<NormalizedMessage>, InboxError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(InboxError::InvalidArgument("search query is empty".into()));
        }

        let principal = self.principal(session)?;
        let refs = self
            .api
            .list_threads(Some(query), clamp_thread_count(max))
            .map_err(|e| remote_error(e, InboxError::SearchFailed))?;

        let report = fetch_threads(self.api.as_ref(), &refs, &principal);
        debug!(
            "Search {:?} matched {} threads, {} messages",
            query,
            refs.len(),
            report.messages.len()
        );
        Ok(report.messages)
    }

    /// Send an HTML reply, optionally into an existing thread.
    /// Returns the id of the sent message.
    pub fn send_reply(
        &self,
        session: &mut Session,
        to: &str,
        subject: &str,
        body: &str,
        thread_id: Option<&ThreadId>,
    ) -> Result<String, InboxError> {
        if to.trim().is_empty() {
            return Err(InboxError::InvalidArgument("recipient is empty".into()));
        }
        if body.trim().is_empty() {
            return Err(InboxError::InvalidArgument("message body is empty".into()));
        }

        self.credentials.resolve(session)?;
        let raw = mime::build_raw_message(to, subject, body);
        let sent = self
            .api
            .send_message(&raw, thread_id)
            .map_err(|e| remote_error(e, InboxError::SendFailed))?;

        info!("Sent message {} to {}", sent.id, to.trim());
        Ok(sent.id)
    }

    /// Delete every cached message for the session's account
    pub fn clear_cache(&self, session: &mut Session) -> Result<usize, InboxError> {
        let principal = self.principal(session)?;
        let deleted = self
            .store
            .delete_messages_for_owner(&principal)
            .map_err(InboxError::Persistence)?;
        info!("Cleared {} cached messages for {}", deleted, principal);
        Ok(deleted)
    }
}

/// Fetch and flatten threads on the rayon pool, keeping list order
fn fetch_threads(api: &dyn MailApi, refs: &[ThreadRef], owner_email: &str) -> FlattenReport {
    let reports: Vec<FlattenReport> = refs
        .par_iter()
        .map(|thread_ref| {
            let id = ThreadId::new(thread_ref.id.as_str());
            match api.get_thread(&id) {
                Ok(thread) => flatten_thread(&thread, owner_email),
                Err(e) => {
                    warn!("Skipping thread {}: {:#}", id, e);
                    let mut report = FlattenReport::default();
                    report.thread_failed(thread_ref.id.as_str(), format!("{:#}", e));
                    report
                }
            }
        })
        .collect();

    let mut merged = FlattenReport::default();
    for report in reports {
        merged.extend(report);
    }
    merged
}

/// Keep a credential failure distinguishable from a remote failure
fn remote_error(err: anyhow::Error, wrap: fn(anyhow::Error) -> InboxError) -> InboxError {
    match err.downcast_ref::<InboxError>() {
        Some(InboxError::Unauthenticated) => InboxError::Unauthenticated,
        _ => wrap(err),
    }
}

fn newest_first(mut messages: Vec<NormalizedMessage>, limit: usize) -> Vec<NormalizedMessage> {
    messages.sort_by(|a, b| {
        b.received_at
            .cmp(&a.received_at)
            .then_with(|| b.id.as_str().cmp(a.id.as_str()))
    });
    messages.truncate(limit);
    messages
}
