//! Error taxonomy for operations exposed to the UI boundary
//!
//! Internal helpers return `anyhow::Result`; the credential store and the
//! sync orchestrator translate failures into these variants so callers can
//! tell a login prompt apart from a transient remote failure.
//!
//! Wrapped causes are rendered into the message and not exposed as
//! `source()`, so `{:#}` on an `anyhow::Error` prints each cause once.

/// Errors surfaced by credential and sync operations
#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    /// No credential could be resolved from any tier
    #[error("Not authenticated")]
    Unauthenticated,

    /// A credential exists but the account identity could not be looked up
    #[error("Failed to resolve account identity: {0:#}")]
    IdentityResolutionFailed(anyhow::Error),

    #[error("Sync failed: {0:#}")]
    SyncFailed(anyhow::Error),

    #[error("Search failed: {0:#}")]
    SearchFailed(anyhow::Error),

    #[error("Send failed: {0:#}")]
    SendFailed(anyhow::Error),

    #[error("Analysis failed: {0:#}")]
    AnalysisFailed(anyhow::Error),

    /// The persistent store rejected a write
    #[error("Storage error: {0:#}")]
    Persistence(anyhow::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl InboxError {
    /// Whether the boundary should answer with a login prompt
    pub fn is_auth_required(&self) -> bool {
        matches!(self, InboxError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_display_includes_cause_chain_once() {
        let cause = anyhow!("connection reset").context("Failed to list threads");
        let err = InboxError::SyncFailed(cause);
        let text = err.to_string();
        assert_eq!(text, "Sync failed: Failed to list threads: connection reset");

        let wrapped = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(wrapped.matches("connection reset").count(), 1);
        assert_eq!(wrapped.matches("Failed to list threads").count(), 1);
    }

    #[test]
    fn test_auth_required() {
        assert!(InboxError::Unauthenticated.is_auth_required());
        assert!(!InboxError::InvalidArgument("x".into()).is_auth_required());
        assert!(!InboxError::IdentityResolutionFailed(anyhow!("expired")).is_auth_required());
    }
}
