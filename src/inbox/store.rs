//! Account message store abstraction
//!
//! Defines the trait for pluggable store backends. The store owns the message
//! list and unread flags for an account and only supports whole-list replace:
//! every mutation is a read-modify-write by the caller.
//!
//! There is no compare-and-swap. Two writers that read the same snapshot and
//! both replace it race, and the last write wins; the other write is silently
//! lost. Nothing in this crate detects that.

use super::{AccountId, AccountSnapshot, Message};
use async_trait::async_trait;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a failed fetch is treated by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// Store unreachable; retried next cycle
    Transient,
    /// Response could not be parsed; treated as transient and logged
    Malformed,
    /// Anything else (missing account, rejected request)
    Other,
}

impl FetchFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchFailure::Transient => "transient",
            FetchFailure::Malformed => "malformed",
            FetchFailure::Other => "other",
        }
    }
}

impl StoreError {
    /// Classify this error for the reconciler
    pub fn kind(&self) -> FetchFailure {
        match self {
            StoreError::Unavailable(_) | StoreError::Io(_) | StoreError::Database(_) => {
                FetchFailure::Transient
            }
            StoreError::Http(e) => {
                if e.is_decode() {
                    FetchFailure::Malformed
                } else {
                    FetchFailure::Transient
                }
            }
            StoreError::Malformed(_) | StoreError::Serialization(_) => FetchFailure::Malformed,
            StoreError::AccountNotFound(_) | StoreError::Rejected(_) => FetchFailure::Other,
        }
    }

    /// Whether the next cycle may reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            FetchFailure::Transient | FetchFailure::Malformed
        )
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Trait for account message store backends
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch the full current snapshot for an account
    async fn get_snapshot(&self, account: &AccountId) -> Result<AccountSnapshot>;

    /// Replace the whole message list for an account
    async fn replace_messages(&self, account: &AccountId, messages: Vec<Message>) -> Result<()>;
}

/// Refreshes the authenticated session before a forced fetch
///
/// Authentication is owned elsewhere; this is only the hook the poller calls.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

/// Session refresher for stores that need no authentication
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSession;

#[async_trait]
impl SessionRefresher for NoopSession {
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// Insert a message at the head of an account's list (admin action)
///
/// Read-modify-write like every other mutation, so it can race with the
/// read-state mutator.
pub async fn append_message(
    store: &dyn MessageStore,
    account: &AccountId,
    message: Message,
) -> Result<()> {
    let snapshot = store.get_snapshot(account).await?;
    let mut messages = Vec::with_capacity(snapshot.messages.len() + 1);
    messages.push(message);
    messages.extend(snapshot.messages);
    store.replace_messages(account, messages).await
}
