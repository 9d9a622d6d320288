//! inbox-sync - Account notification synchronization
//!
//! Keeps an unread badge and an inbox list consistent across several open
//! clients of the same account, without a push channel. Decides when a new
//! message deserves an audible cue, and stays quiet for content already seen
//! and for the user's own actions.
//!
//! # Architecture
//!
//! - **inbox**: Messages, snapshots and the store backends (memory, SQLite, HTTP)
//! - **sync**: Reconciler and poll loop, local bus, cross-client relay, alert
//!   policy, read-state mutator, client session wiring
//! - **presenter**: Badge and inbox view state (ratatui)
//! - **config**: YAML configuration
//! - **tui**: Terminal client
//! - **metrics**: Prometheus counters

// Core modules
pub mod config;
pub mod error;
pub mod inbox;
pub mod logging;
pub mod metrics;

// Components
pub mod presenter;
pub mod sync;
pub mod tui;

// Re-exports
pub use error::{InboxSyncError, Result};
