//! Configuration system
//!
//! Loads `~/.config/inbox-sync/config.yaml` with:
//! - The account this client follows
//! - Store backend (local SQLite or remote server)
//! - Poll cadence and focus refresh
//! - Relay file location
//! - Badge cap, preview length and sound preference file
//!
//! Command-line flags override whatever the file says.

mod sync_config;
pub mod validation;

pub use sync_config::{
    config_dir, AlertConfig, PollConfig, RelayConfig, ServerConfig, StoreBackend, StoreConfig,
    SyncConfig,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
