//! SQLite-backed message store
//!
//! Each account is one row holding its whole message list as a JSON array.
//! There is no per-message table on purpose: the store contract is
//! whole-list replace, and partial updates are not offered.
//!
//! # Example
//!
//! ```no_run
//! use inbox_sync::inbox::{AccountId, SqliteStore};
//! use std::path::PathBuf;
//!
//! # async fn run() -> inbox_sync::inbox::StoreResult<()> {
//! let store = SqliteStore::open(PathBuf::from("inbox.db"))?;
//! store.provision(&AccountId::new("acct-1")).await?;
//! # Ok(())
//! # }
//! ```

use super::store::{MessageStore, Result, StoreError};
use super::{AccountId, AccountSnapshot, Message};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tokio::sync::Mutex;

/// SQLite store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an empty snapshot for an account (idempotent)
    pub async fn provision(&self, account: &AccountId) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO accounts (account_id, messages, updated_at) VALUES (?1, '[]', ?2)",
            params![account.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Initialize the database schema
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            account_id TEXT PRIMARY KEY,
            messages TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn get_snapshot(&self, account: &AccountId) -> Result<AccountSnapshot> {
        let raw: Option<String> = {
            let conn = self.conn.lock().await;
            conn.query_row(
                "SELECT messages FROM accounts WHERE account_id = ?1",
                params![account.as_str()],
                |row| row.get(0),
            )
            .optional()?
        };

        let raw = raw.ok_or_else(|| StoreError::AccountNotFound(account.to_string()))?;
        let messages: Vec<Message> = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Malformed(format!("account {}: {}", account, e)))?;
        Ok(AccountSnapshot::new(messages))
    }

    async fn replace_messages(&self, account: &AccountId, messages: Vec<Message>) -> Result<()> {
        let payload = serde_json::to_string(&messages)?;
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE accounts SET messages = ?1, updated_at = ?2 WHERE account_id = ?3",
            params![payload, Utc::now().to_rfc3339(), account.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::AccountNotFound(account.to_string()));
        }
        Ok(())
    }
}
