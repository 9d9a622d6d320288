//! Error types for inbox-sync
//!
//! Module errors (`StoreError`, `MutationError`, `RelayError`, ...) stay
//! precise where they are raised and convert into [`InboxSyncError`] at the
//! command-line boundary. Uses thiserror for ergonomic error handling.

use crate::inbox::{ServerError, StoreError};
use crate::sync::{CueError, MutationError, RelayError};
use thiserror::Error;

/// Result type alias for inbox-sync operations
pub type Result<T> = std::result::Result<T, InboxSyncError>;

/// Crate-level error
#[derive(Error, Debug)]
pub enum InboxSyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Message store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Mark-read failures
    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    /// Cross-client relay errors
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Sound preference errors
    #[error("Sound preference error: {0}")]
    Cue(#[from] CueError),

    /// Store server errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Message not found in the current snapshot
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Errors wrapped with command context, shown with their causes
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

impl InboxSyncError {
    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            InboxSyncError::Store(e) => e.is_transient(),
            InboxSyncError::Mutation(MutationError::Read(e))
            | InboxSyncError::Mutation(MutationError::Write(e)) => e.is_transient(),
            InboxSyncError::Relay(RelayError::Io(_)) => true,
            _ => false,
        }
    }
}
