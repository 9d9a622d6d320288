//! Account message types
//!
//! Defines the messages held in an account inbox and the snapshot the store
//! hands back on every fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique message identifier (unique per account)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new message ID
    pub fn new() -> Self {
        Self(format!(
            "msg-{}-{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            unique_suffix()
        ))
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Nanosecond clock plus a process-wide counter, good enough to keep ids
/// distinct within one account
fn unique_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}{:04x}", nanos, counter)
}

/// Account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Written by an administrator
    #[default]
    Admin,
    /// A booking or submission was rejected
    Rejection,
    /// Generated by the platform
    System,
}

impl MessageKind {
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Admin => "admin",
            MessageKind::Rejection => "rejection",
            MessageKind::System => "system",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(MessageKind::Admin),
            "rejection" => Ok(MessageKind::Rejection),
            "system" => Ok(MessageKind::System),
            other => Err(format!(
                "unknown message kind '{}' (expected admin, rejection or system)",
                other
            )),
        }
    }
}

/// A single inbox entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,

    /// Message category
    pub kind: MessageKind,

    /// Message body
    pub text: String,

    /// Optional display name of the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Whether the account owner has not read this message yet
    #[serde(rename = "unreadFlag")]
    pub unread: bool,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new unread message stamped with the current time
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            kind,
            text: text.into(),
            sender: None,
            unread: true,
            created_at: Utc::now(),
        }
    }

    /// Set the sender
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Override the ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = MessageId::from_string(id);
        self
    }

    /// Override the creation time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Mark as already read
    pub fn read(mut self) -> Self {
        self.unread = false;
        self
    }
}

/// Full current message list for one account
///
/// The unread count is always derived from the list; the store never holds it
/// separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Messages in insertion order (newest admin insert at the head)
    pub messages: Vec<Message>,
}

impl AccountSnapshot {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Number of messages still flagged unread
    pub fn unread_count(&self) -> usize {
        self.messages.iter().filter(|m| m.unread).count()
    }

    /// Total number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Newest creation time across all messages
    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        max_timestamp(&self.messages)
    }

    /// Look up a message by ID
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }
}

/// Newest `created_at` in a message list
pub fn max_timestamp(messages: &[Message]) -> Option<DateTime<Utc>> {
    messages.iter().map(|m| m.created_at).max()
}
