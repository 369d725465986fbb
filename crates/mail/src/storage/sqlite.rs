//! SQLite-based mail storage with zstd-compressed message bodies

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::MailStore;
use crate::models::{AiAnalysis, CredentialRecord, MessageId, NormalizedMessage, ThreadId};

/// zstd level for message bodies
const BODY_COMPRESSION_LEVEL: i32 = 3;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Cached messages, partitioned by owning account
            CREATE TABLE messages (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                owner_email TEXT NOT NULL,
                sender TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                from_header TEXT NOT NULL,
                subject TEXT NOT NULL,
                snippet TEXT NOT NULL,
                body BLOB NOT NULL,  -- zstd compressed
                date_header TEXT,
                received_at INTEGER NOT NULL  -- unix millis
            );

            CREATE INDEX idx_messages_owner_received
                ON messages(owner_email, received_at DESC);
            CREATE INDEX idx_messages_thread_id ON messages(thread_id);

            -- AI analyses, kept apart so message upserts never touch them
            CREATE TABLE analyses (
                message_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                analyzed_at TEXT NOT NULL
            );

            -- One OAuth token set per account
            CREATE TABLE credentials (
                owner_email TEXT PRIMARY KEY,
                tokens TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// SQLite-based mail storage
///
/// All access goes through one connection behind a mutex, so a caller that
/// writes and then reads observes its own writes.
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;

        Self::with_connection(conn)
    }

    /// In-memory database (tests and throwaway sessions)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        // WAL lets readers proceed during writes; NORMAL sync is safe with WAL
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }
}

/// Column list shared by every message read
const MESSAGE_COLUMNS: &str = "m.id, m.thread_id, m.owner_email, m.sender, m.sender_name, \
     m.from_header, m.subject, m.snippet, m.body, m.date_header, m.received_at, a.data";

/// Raw message row; decompression happens outside the rusqlite row callback
struct MessageRow {
    id: String,
    thread_id: String,
    owner_email: String,
    sender: String,
    sender_name: String,
    from: String,
    subject: String,
    snippet: String,
    body: Vec<u8>,
    date: Option<String>,
    received_at: i64,
    analysis: Option<String>,
}

impl MessageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            owner_email: row.get(2)?,
            sender: row.get(3)?,
            sender_name: row.get(4)?,
            from: row.get(5)?,
            subject: row.get(6)?,
            snippet: row.get(7)?,
            body: row.get(8)?,
            date: row.get(9)?,
            received_at: row.get(10)?,
            analysis: row.get(11)?,
        })
    }

    fn into_message(self) -> Result<NormalizedMessage> {
        let body = zstd::decode_all(self.body.as_slice())
            .with_context(|| format!("Failed to decompress body of {}", self.id))?;
        let received_at = DateTime::<Utc>::from_timestamp_millis(self.received_at)
            .with_context(|| format!("Invalid received_at for {}", self.id))?;
        let analysis = match self.analysis {
            Some(data) => Some(
                serde_json::from_str::<AiAnalysis>(&data)
                    .with_context(|| format!("Corrupt analysis for {}", self.id))?,
            ),
            None => None,
        };

        Ok(
            NormalizedMessage::builder(MessageId::new(self.id), ThreadId::new(self.thread_id))
                .owner_email(self.owner_email)
                .sender(self.sender, self.sender_name)
                .from(self.from)
                .subject(self.subject)
                .snippet(self.snippet)
                .body(String::from_utf8_lossy(&body).into_owned())
                .date(self.date)
                .received_at(received_at)
                .build()
                .with_analysis(analysis),
        )
    }
}

impl MailStore for SqliteMailStore {
    fn upsert_messages(&self, messages: &[NormalizedMessage]) -> Result<usize> {
        // Compress before taking the lock
        let bodies = messages
            .iter()
            .map(|m| zstd::encode_all(m.body.as_bytes(), BODY_COMPRESSION_LEVEL))
            .collect::<std::io::Result<Vec<_>>>()
            .context("Failed to compress message body")?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages
                 (id, thread_id, owner_email, sender, sender_name, from_header,
                  subject, snippet, body, date_header, received_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    thread_id = excluded.thread_id,
                    owner_email = excluded.owner_email,
                    sender = excluded.sender,
                    sender_name = excluded.sender_name,
                    from_header = excluded.from_header,
                    subject = excluded.subject,
                    snippet = excluded.snippet,
                    body = excluded.body,
                    date_header = excluded.date_header,
                    received_at = excluded.received_at",
            )?;

            for (message, body) in messages.iter().zip(&bodies) {
                stmt.execute(params![
                    message.id.as_str(),
                    message.thread_id.as_str(),
                    message.owner_email,
                    message.sender,
                    message.sender_name,
                    message.from,
                    message.subject,
                    message.snippet,
                    body,
                    message.date,
                    message.received_at.timestamp_millis(),
                ])
                .with_context(|| format!("Failed to upsert message {}", message.id))?;
            }
        }
        tx.commit().context("Failed to commit message batch")?;

        Ok(messages.len())
    }

    fn list_recent(&self, owner_email: &str, limit: usize) -> Result<Vec<NormalizedMessage>> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m LEFT JOIN analyses a ON a.message_id = m.id
                 WHERE m.owner_email = ?
                 ORDER BY m.received_at DESC, m.id DESC
                 LIMIT ?"
            ))?;
            stmt.query_map(params![owner_email, limit as i64], MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<NormalizedMessage>> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS}
                     FROM messages m LEFT JOIN analyses a ON a.message_id = m.id
                     WHERE m.id = ?"
                ),
                [id.as_str()],
                MessageRow::from_row,
            )
            .optional()?
        };

        row.map(MessageRow::into_message).transpose()
    }

    fn count_messages(&self, owner_email: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE owner_email = ?",
            [owner_email],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_messages_for_owner(&self, owner_email: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM analyses
             WHERE message_id IN (SELECT id FROM messages WHERE owner_email = ?)",
            [owner_email],
        )?;
        let deleted = tx.execute("DELETE FROM messages WHERE owner_email = ?", [owner_email])?;
        tx.commit()?;
        Ok(deleted)
    }

    fn prune_messages(&self, owner_email: &str, keep: usize) -> Result<usize> {
        // Everything for the owner except the `keep` newest rows
        const STALE: &str = "SELECT id FROM messages WHERE owner_email = ?1
             ORDER BY received_at DESC, id DESC LIMIT -1 OFFSET ?2";

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM analyses WHERE message_id IN ({STALE})"),
            params![owner_email, keep as i64],
        )?;
        let deleted = tx.execute(
            &format!("DELETE FROM messages WHERE id IN ({STALE})"),
            params![owner_email, keep as i64],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    fn save_analysis(&self, id: &MessageId, analysis: &AiAnalysis) -> Result<()> {
        let data = serde_json::to_string(analysis)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO analyses (message_id, data, analyzed_at) VALUES (?, ?, ?)
             ON CONFLICT(message_id) DO UPDATE SET
                data = excluded.data,
                analyzed_at = excluded.analyzed_at",
            params![id.as_str(), data, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get_analysis(&self, id: &MessageId) -> Result<Option<AiAnalysis>> {
        let data: Option<String> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT data FROM analyses WHERE message_id = ?",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?
        };

        data.map(|d| serde_json::from_str(&d).context("Corrupt analysis record"))
            .transpose()
    }

    fn get_credential(&self, owner_email: &str) -> Result<Option<CredentialRecord>> {
        let tokens: Option<String> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT tokens FROM credentials WHERE owner_email = ?",
                [owner_email],
                |row| row.get(0),
            )
            .optional()?
        };

        let Some(tokens) = tokens else {
            return Ok(None);
        };
        let tokens = serde_json::from_str(&tokens).context("Corrupt credential record")?;
        Ok(Some(CredentialRecord::new(owner_email, tokens)))
    }

    fn upsert_credential(&self, record: &CredentialRecord) -> Result<()> {
        let tokens = serde_json::to_string(&record.tokens)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO credentials (owner_email, tokens, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(owner_email) DO UPDATE SET
                tokens = excluded.tokens,
                updated_at = excluded.updated_at",
            params![record.owner_email, tokens, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete_credential(&self, owner_email: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM credentials WHERE owner_email = ?", [owner_email])?;
        Ok(deleted > 0)
    }
}
