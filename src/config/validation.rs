//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that would only fail later,
//! deep inside a reload cycle. All problems are reported at once.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::HotswapConfig;
use crate::net::listener::parse_bind_address;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a loaded configuration, collecting every error.
pub fn validate_config(config: &HotswapConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = parse_bind_address(&config.listener.bind_address) {
        errors.push(ValidationError::new("listener.bind_address", e.to_string()));
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::new("listener.backlog", "must be greater than 0"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than 0",
        ));
    }
    if config.reload.payload_path.trim().is_empty() {
        errors.push(ValidationError::new("reload.payload_path", "must not be empty"));
    }
    if config.reload.interval_ms == 0 {
        errors.push(ValidationError::new("reload.interval_ms", "must be greater than 0"));
    }
    if config.shutdown.drain_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "shutdown.drain_timeout_ms",
            "must be greater than 0",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&HotswapConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = HotswapConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.reload.interval_ms = 0;
        config.shutdown.drain_timeout_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "reload.interval_ms",
                "shutdown.drain_timeout_ms"
            ]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = HotswapConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.metrics_address");
    }
}
