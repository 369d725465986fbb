//! Credential tiers, consulted in order: memory, durable store, local file

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::models::{CredentialRecord, OAuthTokens};
use crate::storage::MailStore;

/// Where a resolved credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Memory,
    Durable,
    File,
}

/// One place tokens can be kept
///
/// `principal` is the account address when the caller knows it. Tiers that
/// only ever hold a single account ignore it.
pub trait CredentialTier: Send + Sync {
    fn tier(&self) -> Tier;

    fn resolve(&self, principal: Option<&str>) -> Result<Option<OAuthTokens>>;

    fn store(&self, principal: Option<&str>, tokens: &OAuthTokens) -> Result<()>;

    /// Remove stored tokens. Nothing stored is not an error.
    fn clear(&self, principal: Option<&str>) -> Result<()>;
}

/// Process-lifetime token slot
#[derive(Default)]
pub struct MemoryTier {
    tokens: RwLock<Option<OAuthTokens>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self) -> Result<Option<OAuthTokens>> {
        self.tokens
            .read()
            .map(|t| t.clone())
            .map_err(|_| anyhow!("Credential lock poisoned"))
    }

    pub(crate) fn set(&self, tokens: Option<OAuthTokens>) -> Result<()> {
        let mut slot = self
            .tokens
            .write()
            .map_err(|_| anyhow!("Credential lock poisoned"))?;
        *slot = tokens;
        Ok(())
    }
}

impl CredentialTier for MemoryTier {
    fn tier(&self) -> Tier {
        Tier::Memory
    }

    fn resolve(&self, _principal: Option<&str>) -> Result<Option<OAuthTokens>> {
        self.get()
    }

    fn store(&self, _principal: Option<&str>, tokens: &OAuthTokens) -> Result<()> {
        self.set(Some(tokens.clone()))
    }

    fn clear(&self, _principal: Option<&str>) -> Result<()> {
        self.set(None)
    }
}

/// Credential records in the mail store, one per account
pub struct DurableTier {
    store: Arc<dyn MailStore>,
}

impl DurableTier {
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }
}

impl CredentialTier for DurableTier {
    fn tier(&self) -> Tier {
        Tier::Durable
    }

    fn resolve(&self, principal: Option<&str>) -> Result<Option<OAuthTokens>> {
        let Some(principal) = principal else {
            return Ok(None);
        };
        Ok(self.store.get_credential(principal)?.map(|r| r.tokens))
    }

    fn store(&self, principal: Option<&str>, tokens: &OAuthTokens) -> Result<()> {
        let principal = principal.context("Cannot store a credential without an account")?;
        self.store
            .upsert_credential(&CredentialRecord::new(principal, tokens.clone()))
    }

    fn clear(&self, principal: Option<&str>) -> Result<()> {
        if let Some(principal) = principal {
            self.store.delete_credential(principal)?;
        }
        Ok(())
    }
}

/// Single-account JSON token file (local development fallback)
pub struct FileTier {
    path: PathBuf,
}

impl FileTier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialTier for FileTier {
    fn tier(&self) -> Tier {
        Tier::File
    }

    fn resolve(&self, _principal: Option<&str>) -> Result<Option<OAuthTokens>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let tokens = config::load_json_file(&self.path)?;
        Ok(Some(tokens))
    }

    fn store(&self, _principal: Option<&str>, tokens: &OAuthTokens) -> Result<()> {
        config::save_json_file(&self.path, tokens)?;

        // Tokens grant mailbox access; keep the file private
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict permissions on {:?}", self.path))?;
        }

        Ok(())
    }

    fn clear(&self, _principal: Option<&str>) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {:?}", self.path)),
        }
    }
}
