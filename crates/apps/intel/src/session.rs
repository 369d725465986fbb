//! Remembers the signed-in account between CLI runs

use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};

use mail::Session;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSession {
    principal: Option<String>,
}

/// Restore the last session, or start a fresh one
pub fn load() -> Session {
    if !config::config_exists(SESSION_FILE) {
        return Session::new();
    }
    match config::load_json::<StoredSession>(SESSION_FILE) {
        Ok(StoredSession {
            principal: Some(principal),
        }) => Session::with_principal(principal),
        Ok(_) => Session::new(),
        Err(e) => {
            warn!("Ignoring unreadable session file: {:#}", e);
            Session::new()
        }
    }
}

pub fn save(session: &Session) -> Result<()> {
    config::save_json(
        SESSION_FILE,
        &StoredSession {
            principal: session.principal().map(str::to_string),
        },
    )
}
