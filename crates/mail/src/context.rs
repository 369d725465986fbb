//! Wiring of store, credentials, Gmail client and analyst from settings
//!
//! Both the CLI and the FFI service hold one `MailContext` for the life of
//! the process.

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use std::sync::Arc;

use crate::analysis::{self, Analyst, GeminiAnalyst};
use crate::config::{GmailCredentials, InboxSettings};
use crate::credentials::{CredentialStore, FileTier, Session};
use crate::error::InboxError;
use crate::gmail::{GmailAuth, GmailClient, MailApi};
use crate::models::{MessageId, OAuthTokens};
use crate::query::{self, ThreadSummary};
use crate::storage::{MailStore, SqliteMailStore};
use crate::sync::Orchestrator;

pub struct MailContext {
    settings: InboxSettings,
    orchestrator: Orchestrator,
    analyst: Option<Arc<dyn Analyst>>,
}

impl MailContext {
    /// Open the SQLite cache and build every collaborator. Missing OAuth
    /// client credentials or Gemini key disable login/refresh or analysis
    /// rather than failing.
    pub fn open(settings: InboxSettings) -> Result<Self> {
        let db_path = settings.database_path()?;
        let store: Arc<dyn MailStore> = Arc::new(
            SqliteMailStore::new(&db_path)
                .with_context(|| format!("Failed to open mail cache at {:?}", db_path))?,
        );
        info!("Mail cache at {:?}", db_path);

        let agent = settings.http_agent();

        let mut credentials = CredentialStore::new().with_durable(store.clone());
        if let Some(path) = settings.token_file_path() {
            credentials = credentials.with_file(FileTier::new(path));
        }
        match GmailCredentials::load() {
            Ok(client) => credentials = credentials.with_auth(GmailAuth::new(&client, agent.clone())),
            Err(e) => warn!("OAuth client not configured, login and refresh disabled: {:#}", e),
        }
        let credentials = Arc::new(credentials);

        let api: Arc<dyn MailApi> = Arc::new(
            GmailClient::new(agent.clone(), credentials.clone())
                .with_fetch_attempts(settings.fetch_attempts),
        );

        let analyst: Option<Arc<dyn Analyst>> =
            match GeminiAnalyst::from_env(agent, settings.gemini_model.clone()) {
                Ok(gemini) => Some(Arc::new(gemini)),
                Err(e) => {
                    warn!("AI analysis disabled: {:#}", e);
                    None
                }
            };

        Ok(Self::from_parts(settings, api, store, credentials, analyst))
    }

    /// Assemble from explicit collaborators
    pub fn from_parts(
        settings: InboxSettings,
        api: Arc<dyn MailApi>,
        store: Arc<dyn MailStore>,
        credentials: Arc<CredentialStore>,
        analyst: Option<Arc<dyn Analyst>>,
    ) -> Self {
        let orchestrator =
            Orchestrator::new(api, store, credentials).with_retention(settings.retention());
        Self {
            settings,
            orchestrator,
            analyst,
        }
    }

    pub fn settings(&self) -> &InboxSettings {
        &self.settings
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn credentials(&self) -> &CredentialStore {
        self.orchestrator.credentials()
    }

    /// Run the loopback OAuth flow in a browser and install the tokens
    pub fn login(&self, session: &mut Session) -> Result<String> {
        let auth = self
            .credentials()
            .auth()
            .context("OAuth client credentials are not configured")?;
        let tokens = auth.authorize()?;
        Ok(self.install_tokens(session, tokens)?)
    }

    /// Finish a login whose redirect was handled by the caller
    pub fn login_with_code(
        &self,
        session: &mut Session,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String> {
        let auth = self
            .credentials()
            .auth()
            .context("OAuth client credentials are not configured")?;
        let tokens = auth.exchange_code(code, redirect_uri)?;
        Ok(self.install_tokens(session, tokens)?)
    }

    fn install_tokens(&self, session: &mut Session, tokens: OAuthTokens) -> Result<String, InboxError> {
        self.credentials()
            .complete_login(session, tokens, self.orchestrator.api())
    }

    fn analyst(&self) -> Result<&dyn Analyst, InboxError> {
        self.analyst
            .as_deref()
            .ok_or_else(|| InboxError::AnalysisFailed(anyhow!("GEMINI_API_KEY is not configured")))
    }

    /// Analyze the latest message of each cached thread
    pub fn analyze_inbox(&self, session: &mut Session, force: bool) -> Result<usize, InboxError> {
        let principal = self.orchestrator.principal(session)?;
        let analyst = self.analyst()?;
        analysis::analyze_threads(self.orchestrator.store().as_ref(), analyst, &principal, force)
    }

    /// Draft a reply to a cached message of the session's account
    pub fn draft_reply(&self, session: &mut Session, message_id: &str) -> Result<String, InboxError> {
        let principal = self.orchestrator.principal(session)?;
        let message = self
            .orchestrator
            .store()
            .get_message(&MessageId::new(message_id))
            .map_err(InboxError::Persistence)?
            .filter(|m| m.owner_email == principal)
            .ok_or_else(|| InboxError::InvalidArgument(format!("unknown message {}", message_id)))?;

        Ok(analysis::draft_reply(self.analyst()?, &message))
    }

    /// Cached threads, most urgent first
    pub fn list_threads(&self, session: &mut Session) -> Result<Vec<ThreadSummary>, InboxError> {
        let principal = self.orchestrator.principal(session)?;
        query::list_threads(self.orchestrator.store().as_ref(), &principal)
            .map_err(InboxError::Persistence)
    }
}
