//! Account inbox: messages, snapshots and the store they live in
//!
//! The store owns the message list and unread flags for each account. The
//! synchronization engine only ever reads a full snapshot or replaces the
//! full list.
//!
//! # Backends
//!
//! - [`MemoryStore`] - In-process, shared by clients in one process
//! - [`SqliteStore`] - One row per account on disk
//! - [`RemoteStore`] - HTTP client for [`StoreServer`]

mod memory;
mod message;
mod remote;
mod server;
mod sqlite;
mod store;

pub use memory::MemoryStore;
pub use message::{max_timestamp, AccountId, AccountSnapshot, Message, MessageId, MessageKind};
pub use remote::RemoteStore;
pub use server::{ServerError, SnapshotResponse, StoreServer};
pub use sqlite::SqliteStore;
pub use store::{
    append_message, FetchFailure, MessageStore, NoopSession, Result as StoreResult,
    SessionRefresher, StoreError,
};
