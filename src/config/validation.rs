//! Configuration validation
//!
//! Checks a loaded configuration before a client mounts:
//! - Account is set
//! - Poll interval is between one second and one hour
//! - Badge cap and preview length are positive
//! - Remote backend has a URL

use super::sync_config::{StoreBackend, SyncConfig};
use crate::InboxSyncError;

const MIN_INTERVAL_SECS: u64 = 1;
const MAX_INTERVAL_SECS: u64 = 3600;

/// Validation error details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a configuration, collecting every problem
pub fn validate_config(config: &SyncConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.account.trim().is_empty() {
        errors.push(ValidationError::new("account", "Account must not be empty"));
    }

    let interval = config.poll.interval_secs;
    if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval) {
        errors.push(ValidationError::new(
            "poll.interval_secs",
            format!(
                "Interval must be between {} and {} seconds, got {}",
                MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, interval
            ),
        ));
    }

    if config.relay.poll_millis == 0 {
        errors.push(ValidationError::new(
            "relay.poll_millis",
            "Relay poll interval must be positive",
        ));
    }

    if config.alert.badge_cap == 0 {
        errors.push(ValidationError::new(
            "alert.badge_cap",
            "Badge cap must be at least 1",
        ));
    }

    if config.alert.preview_chars == 0 {
        errors.push(ValidationError::new(
            "alert.preview_chars",
            "Preview length must be at least 1",
        ));
    }

    if config.store.backend == StoreBackend::Remote {
        match config.store.url.as_deref() {
            None | Some("") => errors.push(ValidationError::new(
                "store.url",
                "Remote backend requires a URL",
            )),
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                errors.push(ValidationError::new(
                    "store.url",
                    format!("URL must use http or https: {}", url),
                ))
            }
            Some(_) => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and convert to the crate error type
pub fn validate_config_result(config: &SyncConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        InboxSyncError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SyncConfig::new()).is_ok());
    }

    #[test]
    fn test_collects_every_issue() {
        let mut config = SyncConfig::new();
        config.account = " ".to_string();
        config.poll.interval_secs = 0;
        config.alert.badge_cap = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["account", "poll.interval_secs", "alert.badge_cap"]);
    }

    #[test]
    fn test_interval_upper_bound() {
        let mut config = SyncConfig::new();
        config.poll.interval_secs = 3601;
        assert!(validate_config(&config).is_err());
        config.poll.interval_secs = 3600;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_remote_requires_url() {
        let mut config = SyncConfig::new();
        config.store.backend = StoreBackend::Remote;
        assert!(validate_config(&config).is_err());

        config.store.url = Some("ftp://example.com".to_string());
        assert!(validate_config(&config).is_err());

        config.store.url = Some("http://127.0.0.1:8086".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_result_wraps_messages() {
        let mut config = SyncConfig::new();
        config.account.clear();
        let err = validate_config_result(&config).unwrap_err();
        assert!(err.to_string().contains("account"));
    }
}
