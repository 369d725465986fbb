//! Gmail OAuth2 authentication
//!
//! Implements the OAuth2 authorization code flow and token refresh. The
//! loopback flow binds a local port, opens the browser and waits for the
//! redirect. Token persistence is not handled here; see `credentials`.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use serde::Deserialize;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use crate::config::GmailCredentials;
use crate::models::OAuthTokens;

/// OAuth2 client for Google's authorization and token endpoints
pub struct GmailAuth {
    client_id: String,
    client_secret: String,
    agent: ureq::Agent,
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_tokens(self) -> OAuthTokens {
        OAuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_in
                .map(|d| Utc::now().timestamp() + d as i64),
            scope: self.scope,
            token_type: self.token_type,
        }
    }
}

impl GmailAuth {
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Read mail, send replies, and learn the account address for storage
    pub const SCOPES: [&'static str; 3] = [
        "https://www.googleapis.com/auth/gmail.readonly",
        "https://www.googleapis.com/auth/gmail.send",
        "https://www.googleapis.com/auth/userinfo.email",
    ];

    /// Port range to try for the local OAuth callback server
    const PORT_RANGE_START: u16 = 8080;
    const PORT_RANGE_END: u16 = 8090;

    /// How long the loopback flow waits for the browser redirect
    const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(credentials: &GmailCredentials, agent: ureq::Agent) -> Self {
        Self {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            agent,
        }
    }

    /// Build the consent URL. Requests offline access and lets the user pick
    /// (or switch) accounts.
    pub fn authorization_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt={}",
            Self::AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&Self::SCOPES.join(" ")),
            urlencoding::encode("select_account consent"),
        )
    }

    /// Exchange an authorization code for tokens
    pub fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuthTokens> {
        let mut response = self
            .agent
            .post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .context("Failed to exchange authorization code")?;

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")?;

        Ok(token.into_tokens())
    }

    /// Refresh an access token. The refresh token is preserved when Google
    /// does not return a new one.
    pub fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let mut response = self
            .agent
            .post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let mut token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse refresh token response")?;

        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        Ok(token.into_tokens())
    }

    /// Run the loopback authorization code flow: open the consent page in a
    /// browser, wait for the redirect and exchange the code.
    pub fn authorize(&self) -> Result<OAuthTokens> {
        let (listener, port) = bind_loopback(Self::PORT_RANGE_START..=Self::PORT_RANGE_END)?;
        let redirect_uri = format!("http://localhost:{}", port);
        let auth_url = self.authorization_url(&redirect_uri);

        info!("Waiting for Google sign-in on port {}", port);
        if let Err(e) = open::that(&auth_url) {
            warn!("Could not launch a browser ({}); open this URL to continue: {}", e, auth_url);
        }

        let mut stream = accept_with_deadline(&listener, Self::CALLBACK_TIMEOUT)?;
        stream.set_nonblocking(false)?;
        let mut request_line = String::new();
        BufReader::new(&stream)
            .read_line(&mut request_line)
            .context("Failed to read the OAuth redirect")?;

        let callback = parse_callback(&request_line);
        reply_to_browser(&mut stream, callback.code.is_some());

        if let Some(err) = callback.error {
            anyhow::bail!("Google rejected the sign-in: {}", err);
        }
        let code = callback
            .code
            .context("Redirect carried no authorization code")?;

        debug!("Received authorization code, exchanging");
        self.exchange_code(&code, &redirect_uri)
    }
}

/// First free loopback port in `ports`
fn bind_loopback(ports: RangeInclusive<u16>) -> Result<(TcpListener, u16)> {
    let (start, end) = (*ports.start(), *ports.end());
    ports
        .into_iter()
        .find_map(|port| TcpListener::bind(("127.0.0.1", port)).ok().map(|l| (l, port)))
        .with_context(|| format!("No free loopback port between {} and {}", start, end))
}

/// Tell the browser tab how it went; the flow continues either way
fn reply_to_browser(stream: &mut TcpStream, signed_in: bool) {
    let (status, message) = if signed_in {
        ("200 OK", "Signed in to Inbox Intel. This tab can be closed.")
    } else {
        ("400 Bad Request", "Sign-in did not complete. Return to Inbox Intel and retry.")
    };
    let page = format!("<!doctype html><title>Inbox Intel</title><p>{}</p>", message);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        page.len(),
        page
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        debug!("Browser went away before the reply: {}", e);
    }
}

fn accept_with_deadline(listener: &TcpListener, timeout: Duration) -> Result<TcpStream> {
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + timeout;

    loop {
        match listener.accept() {
            Ok((stream, _)) => return Ok(stream),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    anyhow::bail!(
                        "Authorization timed out after {} seconds",
                        timeout.as_secs()
                    );
                }
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(e) => return Err(e).context("Failed to accept connection"),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct Callback {
    code: Option<String>,
    error: Option<String>,
}

/// Parse `GET /?code=...&scope=... HTTP/1.1` into the code or error param
fn parse_callback(request_line: &str) -> Callback {
    let Some(path) = request_line.split_whitespace().nth(1) else {
        return Callback::default();
    };
    let Ok(url) = url::Url::parse(&format!("http://localhost{}", path)) else {
        return Callback::default();
    };

    let mut callback = Callback::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => callback.code = Some(value.into_owned()),
            "error" => callback.error = Some(value.into_owned()),
            _ => {}
        }
    }
    callback
}
