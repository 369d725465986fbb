//! OAuth client identity and user settings
//!
//! The OAuth client comes from `GOOGLE_CLIENT_ID`/`GOOGLE_CLIENT_SECRET`,
//! else `google-credentials.json` in the config directory, else
//! `credentials.json` in the working directory. Everything else lives in
//! `settings.json`, where every field is optional.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::CACHED_VIEW_LIMIT;

const CLIENT_ID_VAR: &str = "GOOGLE_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "GOOGLE_CLIENT_SECRET";

/// Client secret file in the config directory
const CLIENT_SECRET_FILE: &str = "google-credentials.json";

/// Client secret file looked up in the working directory
const LOCAL_CLIENT_SECRET_FILE: &str = "credentials.json";

const SETTINGS_FILE: &str = "settings.json";

/// OAuth client identity of this application (not a user credential)
#[derive(Debug, Clone, PartialEq)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Client secret JSON as downloaded from the Google Cloud Console.
/// Desktop clients nest under `installed`, web clients under `web`.
#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClientSecretFile {
    Installed(ClientSecret),
    Web(ClientSecret),
}

#[derive(Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
}

impl From<ClientSecretFile> for GmailCredentials {
    fn from(file: ClientSecretFile) -> Self {
        let (ClientSecretFile::Installed(secret) | ClientSecretFile::Web(secret)) = file;
        Self {
            client_id: secret.client_id,
            client_secret: secret.client_secret,
        }
    }
}

impl GmailCredentials {
    /// Environment first, then the config directory, then the working
    /// directory
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_env()? {
            return Ok(creds);
        }

        let candidates = [
            Self::default_credentials_path(),
            Some(PathBuf::from(LOCAL_CLIENT_SECRET_FILE)),
        ];
        for path in candidates.into_iter().flatten() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        bail!(
            "No OAuth client configured: set {}/{} or add {}",
            CLIENT_ID_VAR,
            CLIENT_SECRET_VAR,
            CLIENT_SECRET_FILE
        )
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file: ClientSecretFile = config::load_json_file(path)?;
        Ok(file.into())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretFile =
            serde_json::from_str(json).context("Not a Google client secret file")?;
        Ok(file.into())
    }

    /// `None` when neither variable is set; an error when only one is
    pub fn from_env() -> Result<Option<Self>> {
        let read = |name: &str| std::env::var(name).ok().filter(|v: &String| !v.trim().is_empty());
        match (read(CLIENT_ID_VAR), read(CLIENT_SECRET_VAR)) {
            (Some(client_id), Some(client_secret)) => Ok(Some(Self {
                client_id,
                client_secret,
            })),
            (None, None) => Ok(None),
            _ => bail!("{} and {} must be set together", CLIENT_ID_VAR, CLIENT_SECRET_VAR),
        }
    }

    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CLIENT_SECRET_FILE)
    }
}

/// User settings (`settings.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxSettings {
    /// SQLite database location (default: config dir / mail.db)
    pub database_path: Option<PathBuf>,
    /// Local token fallback location (default: config dir / token.json)
    pub token_file: Option<PathBuf>,
    /// Disable the local token file tier entirely
    pub disable_token_file: bool,
    /// Global timeout for every HTTP call
    pub http_timeout_secs: u64,
    /// Attempts per thread fetch before the thread is skipped
    pub fetch_attempts: u32,
    /// Gemini model used for analysis and reply drafts
    pub gemini_model: String,
    /// Keep at most this many cached messages per account (None keeps all)
    pub cache_retention: Option<usize>,
}

impl Default for InboxSettings {
    fn default() -> Self {
        Self {
            database_path: None,
            token_file: None,
            disable_token_file: false,
            http_timeout_secs: 30,
            fetch_attempts: 3,
            gemini_model: "gemini-3-flash-preview".to_string(),
            cache_retention: None,
        }
    }
}

impl InboxSettings {
    /// Load `settings.json`, using defaults when it does not exist
    pub fn load() -> Result<Self> {
        config::load_json_or_default(SETTINGS_FILE)
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => config::config_path("mail.db").context("Could not determine config directory"),
        }
    }

    /// Location of the local token file, or None when that tier is disabled
    pub fn token_file_path(&self) -> Option<PathBuf> {
        if self.disable_token_file {
            return None;
        }
        self.token_file
            .clone()
            .or_else(|| config::config_path("token.json"))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// Retention cap, never below the size of the cached view
    pub fn retention(&self) -> Option<usize> {
        self.cache_retention.map(|n| n.max(CACHED_VIEW_LIMIT))
    }

    /// Shared HTTP agent with the configured timeout
    pub fn http_agent(&self) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(self.http_timeout()))
            .build()
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_secret_formats() {
        let desktop = GmailCredentials::from_json(
            r#"{"installed": {"client_id": "desktop-id", "client_secret": "s1",
                "redirect_uris": ["http://localhost"]}}"#,
        )
        .unwrap();
        assert_eq!(desktop.client_id, "desktop-id");
        assert_eq!(desktop.client_secret, "s1");

        let web =
            GmailCredentials::from_json(r#"{"web": {"client_id": "web-id", "client_secret": "s2"}}"#)
                .unwrap();
        assert_eq!(web.client_id, "web-id");

        assert!(GmailCredentials::from_json(r#"{"service_account": {}}"#).is_err());
    }

    #[test]
    fn test_client_secret_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"installed": {"client_id": "file-id", "client_secret": "file-secret"}}"#,
        )
        .unwrap();

        let creds = GmailCredentials::from_file(&path).unwrap();
        assert_eq!(creds.client_secret, "file-secret");
        assert!(GmailCredentials::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_settings_defaults_from_partial_json() {
        let settings: InboxSettings =
            serde_json::from_str(r#"{"http_timeout_secs": 5, "cache_retention": 10}"#).unwrap();
        assert_eq!(settings.http_timeout(), Duration::from_secs(5));
        assert_eq!(settings.fetch_attempts, 3);
        assert_eq!(settings.retention(), Some(CACHED_VIEW_LIMIT));
        assert!(!settings.disable_token_file);
    }

    #[test]
    fn test_token_file_can_be_disabled() {
        let settings = InboxSettings {
            disable_token_file: true,
            token_file: Some(PathBuf::from("/tmp/token.json")),
            ..Default::default()
        };
        assert_eq!(settings.token_file_path(), None);

        let settings = InboxSettings {
            token_file: Some(PathBuf::from("/tmp/token.json")),
            ..Default::default()
        };
        assert_eq!(settings.token_file_path(), Some(PathBuf::from("/tmp/token.json")));
    }
}
