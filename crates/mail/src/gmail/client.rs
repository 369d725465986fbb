//! Gmail API HTTP client
//!
//! Implements `MailApi` against the Gmail REST API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use super::MailApi;
use super::api::{GmailThread, ListThreadsResponse, Profile, SendMessageRequest, SentMessage, ThreadRef};
use crate::credentials::CredentialStore;
use crate::models::ThreadId;

/// Gmail API client bound to whichever account the credential store resolves
pub struct GmailClient {
    agent: ureq::Agent,
    credentials: Arc<CredentialStore>,
    fetch_attempts: u32,
}

impl GmailClient {
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1/users/me";

    pub fn new(agent: ureq::Agent, credentials: Arc<CredentialStore>) -> Self {
        Self {
            agent,
            credentials,
            fetch_attempts: 3,
        }
    }

    /// Attempts per thread fetch (at least one)
    pub fn with_fetch_attempts(mut self, attempts: u32) -> Self {
        self.fetch_attempts = attempts.max(1);
        self
    }

    fn bearer(&self) -> Result<String> {
        let token = self.credentials.access_token()?;
        Ok(format!("Bearer {}", token))
    }

    fn fetch_thread(&self, id: &ThreadId) -> Result<GmailThread> {
        let url = format!(
            "{}/threads/{}?format=full",
            Self::BASE_URL,
            urlencoding::encode(id.as_str())
        );

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &self.bearer()?)
            .call()
            .with_context(|| format!("Failed to fetch thread {}", id))?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse thread response")
    }
}

impl MailApi for GmailClient {
    fn list_threads(&self, query: Option<&str>, max_results: u32) -> Result<Vec<ThreadRef>> {
        let mut url = format!("{}/threads?maxResults={}", Self::BASE_URL, max_results);
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            url.push_str(&format!("&q={}", urlencoding::encode(q)));
        }

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &self.bearer()?)
            .call()
            .context("Failed to send list threads request")?;

        let list: ListThreadsResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list threads response")?;

        let threads = list.threads.unwrap_or_default();
        debug!("Listed {} threads (query: {:?})", threads.len(), query);
        Ok(threads)
    }

    /// Fetch a thread with exponential backoff retry. Client errors other
    /// than rate limiting are not retried.
    fn get_thread(&self, id: &ThreadId) -> Result<GmailThread> {
        let mut delay = Duration::from_millis(100);
        let mut attempt = 1;

        loop {
            match self.fetch_thread(id) {
                Ok(thread) => return Ok(thread),
                Err(e) if attempt < self.fetch_attempts && is_retryable(&e) => {
                    warn!("Fetching thread {} failed (attempt {}): {:#}", id, attempt, e);
                    let jitter = Duration::from_millis(rand_jitter());
                    std::thread::sleep(delay + jitter);
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn get_profile(&self) -> Result<Profile> {
        let url = format!("{}/profile", Self::BASE_URL);

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &self.bearer()?)
            .call()
            .context("Failed to send profile request")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse profile response")
    }

    fn send_message(&self, raw: &str, thread_id: Option<&ThreadId>) -> Result<SentMessage> {
        let url = format!("{}/messages/send", Self::BASE_URL);
        let request = SendMessageRequest {
            raw,
            thread_id: thread_id.map(|t| t.as_str()),
        };

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &self.bearer()?)
            .send_json(&request)
            .context("Failed to send message")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse send response")
    }
}

/// Transport errors, 429 and 5xx are worth another attempt
fn is_retryable(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<ureq::Error>() {
        Some(ureq::Error::StatusCode(code)) => *code == 429 || *code >= 500,
        Some(_) => true,
        None => false,
    }
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let not_found = anyhow::Error::from(ureq::Error::StatusCode(404)).context("fetch");
        assert!(!is_retryable(&not_found));

        let throttled = anyhow::Error::from(ureq::Error::StatusCode(429));
        assert!(is_retryable(&throttled));

        let unavailable = anyhow::Error::from(ureq::Error::StatusCode(503));
        assert!(is_retryable(&unavailable));

        let parse = anyhow::anyhow!("Failed to parse thread response");
        assert!(!is_retryable(&parse));
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..20 {
            assert!(rand_jitter() < 100);
        }
    }
}
