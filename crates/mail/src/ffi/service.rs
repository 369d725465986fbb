//! MailService facade for UniFFI export
//!
//! A high-level, FFI-friendly API over `MailContext`. Every call blocks;
//! hosts should call from a background queue.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::MailContext;
use crate::config::InboxSettings;
use crate::credentials::Session;
use crate::ffi::types::*;
use crate::models::ThreadId;

/// Main service object for mail operations
///
/// Holds one session: the host app is a single user.
#[derive(uniffi::Object)]
pub struct MailService {
    context: MailContext,
    session: Mutex<Session>,
}

impl MailService {
    fn session(&self) -> Result<MutexGuard<'_, Session>, MailError> {
        self.session.lock().map_err(|_| MailError::Database {
            message: "Session lock poisoned".to_string(),
        })
    }
}

#[uniffi::export]
impl MailService {
    /// Create the service from `settings.json`, optionally overriding the
    /// database location
    #[uniffi::constructor]
    pub fn new(db_path: Option<String>) -> Result<Arc<Self>, MailError> {
        let mut settings = InboxSettings::load()?;
        if let Some(path) = db_path {
            settings.database_path = Some(PathBuf::from(path));
        }

        Ok(Arc::new(Self {
            context: MailContext::open(settings)?,
            session: Mutex::new(Session::new()),
        }))
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    pub fn auth_status(&self) -> Result<FfiAuthStatus, MailError> {
        let mut session = self.session()?;
        let status = self
            .context
            .credentials()
            .status(&mut session, self.context.orchestrator().api());
        Ok(status.into())
    }

    /// Run the browser login flow. Returns the account address.
    pub fn login(&self) -> Result<String, MailError> {
        let mut session = self.session()?;
        Ok(self.context.login(&mut session)?)
    }

    /// Consent page URL for hosts that handle the redirect themselves
    pub fn authorization_url(&self, redirect_uri: String) -> Result<String, MailError> {
        let auth = self.context.credentials().auth().ok_or(MailError::AuthRequired)?;
        Ok(auth.authorization_url(&redirect_uri))
    }

    /// Exchange a code received on `redirect_uri`. Returns the account address.
    pub fn complete_login(&self, code: String, redirect_uri: String) -> Result<String, MailError> {
        let mut session = self.session()?;
        Ok(self
            .context
            .login_with_code(&mut session, &code, &redirect_uri)?)
    }

    pub fn logout(&self) -> Result<(), MailError> {
        let mut session = self.session()?;
        self.context.credentials().logout(&mut session);
        Ok(())
    }

    // ========================================================================
    // Mail
    // ========================================================================

    /// Cached messages, newest first (at most 50)
    pub fn cached_inbox(&self) -> Result<Vec<FfiMessage>, MailError> {
        let mut session = self.session()?;
        let messages = self.context.orchestrator().cached_inbox(&mut session)?;
        Ok(messages.into_iter().map(FfiMessage::from).collect())
    }

    /// Fetch up to `max` recent threads (1-20, default 10) and return the
    /// refreshed cached view
    pub fn sync_inbox(&self, max: Option<u32>) -> Result<FfiSyncResult, MailError> {
        let mut session = self.session()?;
        let outcome = self.context.orchestrator().sync_inbox(&mut session, max)?;
        Ok(outcome.into())
    }

    /// Search Gmail directly; results are not cached
    pub fn search_inbox(&self, query: String, max: Option<u32>) -> Result<Vec<FfiMessage>, MailError> {
        let mut session = self.session()?;
        let messages = self
            .context
            .orchestrator()
            .search_inbox(&mut session, &query, max)?;
        Ok(messages.into_iter().map(FfiMessage::from).collect())
    }

    /// Send an HTML reply. Returns the sent message id.
    pub fn send_reply(
        &self,
        to: String,
        subject: String,
        body: String,
        thread_id: Option<String>,
    ) -> Result<String, MailError> {
        let mut session = self.session()?;
        let thread_id = thread_id.map(ThreadId::from);
        Ok(self.context.orchestrator().send_reply(
            &mut session,
            &to,
            &subject,
            &body,
            thread_id.as_ref(),
        )?)
    }

    /// Remove every cached message for the current account
    pub fn clear_cache(&self) -> Result<u32, MailError> {
        let mut session = self.session()?;
        Ok(self.context.orchestrator().clear_cache(&mut session)? as u32)
    }

    // ========================================================================
    // AI
    // ========================================================================

    /// Analyze cached threads that have no analysis yet (all when `force`)
    pub fn analyze_inbox(&self, force: bool) -> Result<u32, MailError> {
        let mut session = self.session()?;
        Ok(self.context.analyze_inbox(&mut session, force)? as u32)
    }

    pub fn draft_reply(&self, message_id: String) -> Result<String, MailError> {
        let mut session = self.session()?;
        Ok(self.context.draft_reply(&mut session, &message_id)?)
    }

    /// Cached threads, most urgent first
    pub fn list_threads(&self) -> Result<Vec<FfiThreadSummary>, MailError> {
        let mut session = self.session()?;
        let threads = self.context.list_threads(&mut session)?;
        Ok(threads.into_iter().map(FfiThreadSummary::from).collect())
    }
}
