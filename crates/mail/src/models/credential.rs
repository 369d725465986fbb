//! OAuth credential models

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// OAuth token set for one Gmail account
///
/// Persisted as JSON in every credential tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) when the access token expires
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl OAuthTokens {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            token_type: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the access token expires within `margin_secs` from now.
    ///
    /// Tokens without a recorded expiry are treated as valid.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= Utc::now().timestamp() + margin_secs,
            None => false,
        }
    }
}

/// Durable per-account credential record, keyed by owner email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub owner_email: String,
    pub tokens: OAuthTokens,
}

impl CredentialRecord {
    pub fn new(owner_email: impl Into<String>, tokens: OAuthTokens) -> Self {
        Self {
            owner_email: owner_email.into(),
            tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_window() {
        let now = Utc::now().timestamp();
        let fresh = OAuthTokens::new("a").with_expires_at(now + 3600);
        assert!(!fresh.expires_within(300));

        let stale = OAuthTokens::new("a").with_expires_at(now + 60);
        assert!(stale.expires_within(300));

        let unknown = OAuthTokens::new("a");
        assert!(!unknown.expires_within(300));
    }

    #[test]
    fn test_tolerates_minimal_json() {
        let tokens: OAuthTokens = serde_json::from_str(r#"{"access_token":"ya29"}"#).unwrap();
        assert_eq!(tokens.access_token, "ya29");
        assert!(tokens.refresh_token.is_none());
        assert!(tokens.expires_at.is_none());
    }
}
