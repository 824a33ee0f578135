//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` or `capture_selector` is empty
    /// - the viewport is empty or larger than 4096px on a side
    /// - `render_timeout_ms` leaves no room for the idle and settle waits
    /// - `min_ttl_secs` is 0
    ///
    /// Returns `ConfigError::Missing` if `bind_addr` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "bind_addr".into(),
                hint: "Set SNAPEMBED_BIND_ADDR environment variable".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        for (field, edge) in [("viewport_width", self.viewport_width), ("viewport_height", self.viewport_height)] {
            if edge == 0 || edge > 4096 {
                return Err(invalid(field, "must be between 1 and 4096"));
            }
        }

        if self.capture_selector.trim().is_empty() {
            return Err(invalid("capture_selector", "must not be empty"));
        }

        if self.render_timeout_ms < 1_000 || self.render_timeout_ms > 300_000 {
            return Err(invalid("render_timeout_ms", "must be between 1000ms and 300000ms"));
        }
        if self.render_timeout_ms <= self.network_idle_ms.saturating_add(self.settle_ms) {
            return Err(invalid("render_timeout_ms", "must exceed network_idle_ms + settle_ms"));
        }

        if self.min_ttl_secs == 0 {
            return Err(invalid("min_ttl_secs", "must be at least 1 second"));
        }

        if self.default_ttl_secs < self.min_ttl_secs {
            tracing::warn!(
                default_ttl_secs = self.default_ttl_secs,
                min_ttl_secs = self.min_ttl_secs,
                "default_ttl_secs is below min_ttl_secs; entries will use the floor"
            );
        }

        if !self.render_enabled && !self.browser_args.is_empty() {
            tracing::warn!("browser_args are set but rendering is disabled");
        }

        Ok(())
    }
}
