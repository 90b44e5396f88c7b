//! Client configuration.
//!
//! [`ClientConfig`] is the serialisable, defaulted form read from JSON.
//! [`ClientConfig::validate`] turns it into [`ClientSettings`], the immutable
//! form the actor runs with. A client never starts with an invalid config.

use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ConnectionMode, ConnectorError, LogicalName, Mode, RetryCount, RetryPolicy};

/// Default discovery name of the forwarder receiver.
pub const DEFAULT_FORWARDER_NAME: &str = "dataflow_forwarder";

/// Default discovery name of the backwarder receiver.
pub const DEFAULT_BACKWARDER_NAME: &str = "dataflow_backwarder";

/// Default number of resolution attempts per establishment.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 5;

/// Default wait before each resolution attempt, in milliseconds.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;

// ---------------------------------------------------------------------------
// Raw configuration
// ---------------------------------------------------------------------------

/// Recognised client options, as written in a configuration file.
///
/// Every field except `mode` has a default.
///
/// ```json
/// { "mode": "pull", "max_retry_count": "infinity", "retry_interval_ms": 250 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Push or Pull (`"demand"` is accepted as an alias for Pull).
    pub mode: Mode,

    /// Enables the backwarder slot. Forced on for Pull mode.
    #[serde(default)]
    pub backward_enabled: bool,

    /// Discovery name of the forwarder.
    #[serde(default = "default_forwarder_name")]
    pub forwarder_name: String,

    /// Discovery name of the backwarder.
    #[serde(default = "default_backwarder_name")]
    pub backwarder_name: String,

    /// Resolution attempts per establishment: a positive integer or `"infinity"`.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: RetryCount,

    /// Wait before each resolution attempt.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// `"client"` connects on start; `"passive"` never connects.
    #[serde(default)]
    pub connection_mode: ConnectionMode,
}

fn default_forwarder_name() -> String {
    DEFAULT_FORWARDER_NAME.to_string()
}

fn default_backwarder_name() -> String {
    DEFAULT_BACKWARDER_NAME.to_string()
}

fn default_max_retry_count() -> RetryCount {
    RetryCount::Limited(NonZeroU32::MIN.saturating_add(DEFAULT_MAX_RETRY_COUNT - 1))
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

impl ClientConfig {
    /// Creates a configuration for `mode` with every other option defaulted.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            backward_enabled: false,
            forwarder_name: default_forwarder_name(),
            backwarder_name: default_backwarder_name(),
            max_retry_count: default_max_retry_count(),
            retry_interval_ms: default_retry_interval_ms(),
            connection_mode: ConnectionMode::default(),
        }
    }

    /// Parses a JSON configuration document.
    ///
    /// Unknown modes, unknown fields and malformed values all surface as
    /// [`ConnectorError::InvalidConfiguration`].
    pub fn from_json_str(json: &str) -> Result<Self, ConnectorError> {
        serde_json::from_str(json).map_err(|e| ConnectorError::invalid_config(e.to_string()))
    }

    /// Validates the configuration and derives the settings the actor runs with.
    pub fn validate(&self) -> Result<ClientSettings, ConnectorError> {
        let forwarder = LogicalName::new(self.forwarder_name.clone())
            .ok_or_else(|| ConnectorError::invalid_config("forwarder_name must not be empty"))?;
        let backwarder = LogicalName::new(self.backwarder_name.clone())
            .ok_or_else(|| ConnectorError::invalid_config("backwarder_name must not be empty"))?;

        if self.retry_interval_ms == 0 {
            return Err(ConnectorError::invalid_config(
                "retry_interval_ms must be greater than zero",
            ));
        }

        let backward_enabled = self.backward_enabled || self.mode.requires_backward();
        if backward_enabled && !self.backward_enabled {
            info!(mode = %self.mode, "Backward flow forced on by mode");
        }

        if backward_enabled && forwarder == backwarder {
            return Err(ConnectorError::invalid_config(format!(
                "forwarder and backwarder must use distinct names (both '{forwarder}')"
            )));
        }

        Ok(ClientSettings {
            mode: self.mode,
            backward_enabled,
            forwarder,
            backwarder,
            retry: RetryPolicy::new(
                self.max_retry_count,
                Duration::from_millis(self.retry_interval_ms),
            ),
            connection_mode: self.connection_mode,
        })
    }
}

// ---------------------------------------------------------------------------
// Validated settings
// ---------------------------------------------------------------------------

/// Validated, immutable client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Push or Pull.
    pub mode: Mode,
    /// Whether the backwarder slot exists. Always `true` in Pull mode.
    pub backward_enabled: bool,
    /// Discovery name of the forwarder.
    pub forwarder: LogicalName,
    /// Discovery name of the backwarder. Unused without backward flow.
    pub backwarder: LogicalName,
    /// Policy for start-up and reconnection establishment.
    pub retry: RetryPolicy,
    /// Whether the client connects at all.
    pub connection_mode: ConnectionMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = ClientConfig::from_json_str(r#"{ "mode": "push" }"#).unwrap();
        assert_eq!(config, ClientConfig::new(Mode::Push));

        let settings = config.validate().unwrap();
        assert!(!settings.backward_enabled);
        assert_eq!(settings.forwarder.as_str(), DEFAULT_FORWARDER_NAME);
        assert_eq!(settings.retry.interval(), Duration::from_millis(100));
        assert_eq!(settings.connection_mode, ConnectionMode::Client);
    }

    #[test]
    fn pull_mode_forces_backward_flow() {
        let settings = ClientConfig::new(Mode::Pull).validate().unwrap();
        assert!(settings.backward_enabled);
    }

    #[test]
    fn unknown_mode_is_invalid_configuration() {
        let err = ClientConfig::from_json_str(r#"{ "mode": "broadcast" }"#).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration { .. }));
    }

    #[test]
    fn infinite_retry_and_passive_mode_parse() {
        let config = ClientConfig::from_json_str(
            r#"{ "mode": "demand", "max_retry_count": "infinity", "connection_mode": "passive" }"#,
        )
        .unwrap();
        assert_eq!(config.mode, Mode::Pull);
        assert_eq!(config.max_retry_count, RetryCount::Unlimited);
        assert_eq!(config.connection_mode, ConnectionMode::Passive);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ClientConfig::new(Mode::Push);
        config.forwarder_name.clear();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::new(Mode::Push);
        config.retry_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::new(Mode::Pull);
        config.backwarder_name = config.forwarder_name.clone();
        assert!(config.validate().is_err());
    }
}
