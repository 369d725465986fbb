//! Credential resolution, persistence and refresh
//!
//! Tokens are looked up in three tiers: process memory, the durable store
//! (keyed by account address), then a local token file. A hit in a lower
//! tier is loaded into memory so later calls stay cheap.

mod session;
mod tiers;

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, RwLock};

pub use session::Session;
pub use tiers::{CredentialTier, DurableTier, FileTier, MemoryTier, Tier};

use crate::error::InboxError;
use crate::gmail::{GmailAuth, MailApi};
use crate::models::OAuthTokens;
use crate::storage::MailStore;

/// Refresh when the access token expires within this many seconds
const REFRESH_MARGIN_SECS: i64 = 300;

/// Tokens plus the tier that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCredential {
    pub tokens: OAuthTokens,
    pub tier: Tier,
}

/// Answer to "am I logged in?"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthStatus {
    /// OAuth client credentials are available
    pub is_configured: bool,
    pub is_authenticated: bool,
    pub user_email: Option<String>,
}

/// Three-tier credential store
pub struct CredentialStore {
    memory: MemoryTier,
    durable: Option<DurableTier>,
    file: Option<FileTier>,
    auth: Option<GmailAuth>,
    /// Account the in-memory tokens belong to, once known
    current_principal: RwLock<Option<String>>,
    /// Serializes refreshes so parallel fetches refresh once
    refresh_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            memory: MemoryTier::new(),
            durable: None,
            file: None,
            auth: None,
            current_principal: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Persist per-account records in `store`
    pub fn with_durable(mut self, store: Arc<dyn MailStore>) -> Self {
        self.durable = Some(DurableTier::new(store));
        self
    }

    /// Fall back to a local token file
    pub fn with_file(mut self, file: FileTier) -> Self {
        self.file = Some(file);
        self
    }

    /// OAuth client used for refresh and login
    pub fn with_auth(mut self, auth: GmailAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn auth(&self) -> Option<&GmailAuth> {
        self.auth.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.auth.is_some()
    }

    /// Tiers in lookup order
    fn tiers(&self) -> impl Iterator<Item = &dyn CredentialTier> {
        std::iter::once(&self.memory as &dyn CredentialTier)
            .chain(self.durable.iter().map(|t| t as &dyn CredentialTier))
            .chain(self.file.iter().map(|t| t as &dyn CredentialTier))
    }

    fn current_principal(&self) -> Option<String> {
        self.current_principal.read().ok().and_then(|p| p.clone())
    }

    fn set_current_principal(&self, principal: Option<String>) {
        if let Ok(mut current) = self.current_principal.write() {
            *current = principal;
        }
    }

    /// Find usable tokens: memory, then the durable record for the session's
    /// account, then the token file.
    pub fn resolve(&self, session: &Session) -> Result<ResolvedCredential, InboxError> {
        for tier in self.tiers() {
            let tokens = match tier.resolve(session.principal()) {
                Ok(Some(tokens)) => tokens,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Ignoring unreadable {:?} credential: {:#}", tier.tier(), e);
                    continue;
                }
            };

            if tier.tier() != Tier::Memory {
                debug!("Loaded credential from {:?} tier", tier.tier());
                self.memory
                    .set(Some(tokens.clone()))
                    .map_err(InboxError::Persistence)?;
                self.set_current_principal(session.principal().map(str::to_string));
            }

            return Ok(ResolvedCredential {
                tokens,
                tier: tier.tier(),
            });
        }

        Err(InboxError::Unauthenticated)
    }

    /// Install freshly exchanged tokens: memory first, then look up the
    /// account and persist the durable record. The token file is written
    /// best effort. Returns the account address.
    pub fn complete_login(
        &self,
        session: &mut Session,
        tokens: OAuthTokens,
        identity: &dyn MailApi,
    ) -> Result<String, InboxError> {
        self.memory
            .set(Some(tokens.clone()))
            .map_err(InboxError::Persistence)?;
        session.clear();
        self.set_current_principal(None);

        let principal = self.principal(session, identity)?;

        if let Some(durable) = &self.durable {
            durable
                .store(Some(&principal), &tokens)
                .map_err(InboxError::Persistence)?;
        }
        if let Some(file) = &self.file
            && let Err(e) = file.store(Some(&principal), &tokens)
        {
            warn!("Failed to write token file {:?}: {:#}", file.path(), e);
        }

        info!("Logged in as {}", principal);
        Ok(principal)
    }

    /// Forget the session's credentials in every tier. Each tier is cleared
    /// independently; failures are logged.
    pub fn logout(&self, session: &mut Session) {
        let principal = session
            .principal()
            .map(str::to_string)
            .or_else(|| self.current_principal());

        for tier in self.tiers() {
            if let Err(e) = tier.clear(principal.as_deref()) {
                warn!("Failed to clear {:?} credential: {:#}", tier.tier(), e);
            }
        }

        session.clear();
        self.set_current_principal(None);
        info!("Logged out{}", principal.map(|p| format!(" {}", p)).unwrap_or_default());
    }

    pub fn status(&self, session: &mut Session, identity: &dyn MailApi) -> AuthStatus {
        let is_authenticated = self.resolve(session).is_ok();
        let user_email = if is_authenticated {
            match self.principal(session, identity) {
                Ok(principal) => Some(principal),
                Err(e) => {
                    warn!("Could not resolve account for status: {}", e);
                    None
                }
            }
        } else {
            None
        };

        AuthStatus {
            is_configured: self.is_configured(),
            is_authenticated,
            user_email,
        }
    }

    /// The session's account address, looked up via the profile endpoint
    /// on first use and cached on the session.
    pub fn principal(
        &self,
        session: &mut Session,
        identity: &dyn MailApi,
    ) -> Result<String, InboxError> {
        if let Some(principal) = session.principal() {
            return Ok(principal.to_string());
        }

        self.resolve(session)?;
        let profile = identity
            .get_profile()
            .map_err(InboxError::IdentityResolutionFailed)?;

        let principal = profile.email_address;
        session.set_principal(principal.clone());
        self.set_current_principal(Some(principal.clone()));
        Ok(principal)
    }

    /// Current access token, refreshed first when it is about to expire
    pub fn access_token(&self) -> Result<String> {
        let tokens = self
            .memory
            .get()?
            .ok_or_else(|| anyhow::Error::new(InboxError::Unauthenticated))?;

        if !tokens.expires_within(REFRESH_MARGIN_SECS) {
            return Ok(tokens.access_token);
        }

        let _guard = self
            .refresh_lock
            .lock()
            .map_err(|_| anyhow!("Refresh lock poisoned"))?;

        // Another caller may have refreshed while we waited
        let tokens = self
            .memory
            .get()?
            .ok_or_else(|| anyhow::Error::new(InboxError::Unauthenticated))?;
        if !tokens.expires_within(REFRESH_MARGIN_SECS) {
            return Ok(tokens.access_token);
        }

        let (Some(auth), Some(refresh_token)) = (&self.auth, tokens.refresh_token.as_deref()) else {
            debug!("Access token near expiry and no way to refresh it");
            return Ok(tokens.access_token);
        };

        let refreshed = auth
            .refresh(refresh_token)
            .context("Access token expired and refresh failed")?;
        self.store_refreshed(&refreshed)?;

        info!("Refreshed access token");
        Ok(refreshed.access_token)
    }

    /// Write refreshed tokens to memory, the durable record of the account
    /// they belong to (when known) and the token file
    fn store_refreshed(&self, refreshed: &OAuthTokens) -> Result<()> {
        self.memory.set(Some(refreshed.clone()))?;

        let principal = self.current_principal();
        if let Some(durable) = &self.durable
            && principal.is_some()
            && let Err(e) = durable.store(principal.as_deref(), refreshed)
        {
            warn!("Failed to persist refreshed credential: {:#}", e);
        }
        if let Some(file) = &self.file
            && let Err(e) = file.store(principal.as_deref(), refreshed)
        {
            warn!("Failed to write token file {:?}: {:#}", file.path(), e);
        }
        Ok(())
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::{GmailThread, Profile, SentMessage, ThreadRef};
    use crate::models::ThreadId;
    use crate::storage::InMemoryMailStore;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct Identity {
        email: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Identity {
        fn new(email: Option<&'static str>) -> Self {
            Self {
                email,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl MailApi for Identity {
        fn list_threads(&self, _: Option<&str>, _: u32) -> Result<Vec<ThreadRef>> {
            unimplemented!()
        }

        fn get_thread(&self, _: &ThreadId) -> Result<GmailThread> {
            unimplemented!()
        }

        fn get_profile(&self) -> Result<Profile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let email = self.email.ok_or_else(|| anyhow!("401 Unauthorized"))?;
            Ok(Profile {
                email_address: email.to_string(),
                messages_total: None,
                threads_total: None,
                history_id: None,
            })
        }

        fn send_message(&self, _: &str, _: Option<&ThreadId>) -> Result<SentMessage> {
            unimplemented!()
        }
    }

    fn store_with_tiers(dir: &tempfile::TempDir) -> (CredentialStore, Arc<InMemoryMailStore>) {
        let mail = Arc::new(InMemoryMailStore::new());
        let store = CredentialStore::new()
            .with_durable(mail.clone())
            .with_file(FileTier::new(dir.path().join("token.json")));
        (store, mail)
    }

    #[test]
    fn test_unauthenticated_when_empty() {
        let dir = tempdir().unwrap();
        let (store, _) = store_with_tiers(&dir);
        let err = store.resolve(&Session::new()).unwrap_err();
        assert!(err.is_auth_required());
        assert!(store.access_token().is_err());
    }

    #[test]
    fn test_login_populates_every_tier() {
        let dir = tempdir().unwrap();
        let (store, mail) = store_with_tiers(&dir);
        let identity = Identity::new(Some("me@example.com"));
        let mut session = Session::new();

        let principal = store
            .complete_login(&mut session, OAuthTokens::new("access"), &identity)
            .unwrap();

        assert_eq!(principal, "me@example.com");
        assert_eq!(session.principal(), Some("me@example.com"));
        assert_eq!(store.resolve(&session).unwrap().tier, Tier::Memory);
        assert!(mail.get_credential("me@example.com").unwrap().is_some());
        assert!(dir.path().join("token.json").exists());
        assert_eq!(store.access_token().unwrap(), "access");
    }

    #[test]
    fn test_durable_tier_used_with_known_principal() {
        let dir = tempdir().unwrap();
        let mail = Arc::new(InMemoryMailStore::new());
        mail.upsert_credential(&crate::models::CredentialRecord::new(
            "me@example.com",
            OAuthTokens::new("durable"),
        ))
        .unwrap();
        let store = CredentialStore::new()
            .with_durable(mail)
            .with_file(FileTier::new(dir.path().join("token.json")));

        assert!(store.resolve(&Session::new()).is_err());

        let session = Session::with_principal("me@example.com");
        let resolved = store.resolve(&session).unwrap();
        assert_eq!(resolved.tier, Tier::Durable);
        assert_eq!(resolved.tokens.access_token, "durable");

        // Promoted into memory
        assert_eq!(store.resolve(&Session::new()).unwrap().tier, Tier::Memory);
    }

    #[test]
    fn test_file_tier_fallback_and_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "garbage").unwrap();
        let (store, _) = store_with_tiers(&dir);
        assert!(store.resolve(&Session::new()).unwrap_err().is_auth_required());

        config::save_json_file(&path, &OAuthTokens::new("from-file")).unwrap();
        let resolved = store.resolve(&Session::new()).unwrap();
        assert_eq!(resolved.tier, Tier::File);
        assert_eq!(resolved.tokens.access_token, "from-file");
    }

    #[test]
    fn test_file_hit_keeps_session_account_for_refresh() {
        let dir = tempdir().unwrap();
        config::save_json_file(&dir.path().join("token.json"), &OAuthTokens::new("from-file"))
            .unwrap();
        let (store, mail) = store_with_tiers(&dir);

        let session = Session::with_principal("me@example.com");
        assert_eq!(store.resolve(&session).unwrap().tier, Tier::File);
        assert_eq!(store.current_principal().as_deref(), Some("me@example.com"));

        store
            .store_refreshed(&OAuthTokens::new("refreshed"))
            .unwrap();
        let record = mail.get_credential("me@example.com").unwrap().unwrap();
        assert_eq!(record.tokens.access_token, "refreshed");
        assert_eq!(store.access_token().unwrap(), "refreshed");
    }

    #[test]
    fn test_logout_clears_all_tiers() {
        let dir = tempdir().unwrap();
        let (store, mail) = store_with_tiers(&dir);
        let identity = Identity::new(Some("me@example.com"));
        let mut session = Session::new();
        store
            .complete_login(&mut session, OAuthTokens::new("access"), &identity)
            .unwrap();

        store.logout(&mut session);

        assert_eq!(session.principal(), None);
        assert!(mail.get_credential("me@example.com").unwrap().is_none());
        assert!(!dir.path().join("token.json").exists());
        let status = store.status(&mut session, &identity);
        assert!(!status.is_authenticated);
        assert_eq!(status.user_email, None);

        // Logging out twice is harmless
        store.logout(&mut session);
    }

    #[test]
    fn test_principal_cached_on_session() {
        let store = CredentialStore::new();
        let identity = Identity::new(Some("me@example.com"));
        let mut session = Session::new();

        assert!(
            store
                .principal(&mut session, &identity)
                .unwrap_err()
                .is_auth_required()
        );
        assert_eq!(identity.calls.load(Ordering::SeqCst), 0);

        store.memory.set(Some(OAuthTokens::new("a"))).unwrap();
        store.principal(&mut session, &identity).unwrap();
        store.principal(&mut session, &identity).unwrap();
        assert_eq!(identity.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_identity_failure_is_distinct() {
        let store = CredentialStore::new();
        store.memory.set(Some(OAuthTokens::new("a"))).unwrap();
        let mut session = Session::new();

        let err = store
            .principal(&mut session, &Identity::new(None))
            .unwrap_err();
        assert!(matches!(err, InboxError::IdentityResolutionFailed(_)));

        let status = store.status(&mut session, &Identity::new(None));
        assert!(status.is_authenticated);
        assert!(!status.is_configured);
        assert_eq!(status.user_email, None);
    }

    #[test]
    fn test_expired_token_without_refresh_is_returned() {
        let store = CredentialStore::new();
        let expired = OAuthTokens::new("stale").with_expires_at(Utc::now().timestamp() - 10);
        store.memory.set(Some(expired)).unwrap();
        assert_eq!(store.access_token().unwrap(), "stale");
    }
}
