//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SNAPEMBED_*)
//! 2. TOML config file (if SNAPEMBED_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SNAPEMBED_*)
/// 2. TOML config file (if SNAPEMBED_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server listens on.
    ///
    /// Set via SNAPEMBED_BIND_ADDR environment variable.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Path to SQLite image cache database.
    ///
    /// Set via SNAPEMBED_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via SNAPEMBED_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request, also the discovery scan limit.
    ///
    /// Set via SNAPEMBED_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via SNAPEMBED_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether rich embeds are rendered in a headless browser.
    ///
    /// Set via SNAPEMBED_RENDER_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub render_enabled: bool,

    /// Upper bound for one render, from page setup to capture.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    #[serde(default = "default_viewport_edge")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_edge")]
    pub viewport_height: u32,

    /// Quiet window with no in-flight requests before the page counts as idle.
    #[serde(default = "default_quiet_ms")]
    pub network_idle_ms: u64,

    /// Extra delay after network idle for late layout and animation.
    #[serde(default = "default_quiet_ms")]
    pub settle_ms: u64,

    /// Selector narrowing the capture to the embed's root element.
    #[serde(default = "default_capture_selector")]
    pub capture_selector: String,

    /// Chrome/Chromium binary. Auto-detected when unset.
    ///
    /// Set via SNAPEMBED_CHROME_EXECUTABLE environment variable.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    /// Extra command line flags for the browser (e.g. `--no-sandbox`).
    #[serde(default)]
    pub browser_args: Vec<String>,

    /// Cache lifetime when the oEmbed document has no `cache_age`.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Shortest lifetime the image store accepts; shorter requests are raised.
    #[serde(default = "default_min_ttl_secs")]
    pub min_ttl_secs: u64,

    /// Interval between expired-entry sweeps. 0 disables the sweep.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8787".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./snapembed-cache.sqlite")
}

fn default_user_agent() -> String {
    "snapembed/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_render_timeout_ms() -> u64 {
    30_000
}

fn default_viewport_edge() -> u32 {
    600
}

fn default_quiet_ms() -> u64 {
    1_000
}

fn default_capture_selector() -> String {
    "body div".into()
}

fn default_ttl_secs() -> u64 {
    14_400
}

fn default_min_ttl_secs() -> u64 {
    60
}

fn default_purge_interval_secs() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            render_enabled: true,
            render_timeout_ms: default_render_timeout_ms(),
            viewport_width: default_viewport_edge(),
            viewport_height: default_viewport_edge(),
            network_idle_ms: default_quiet_ms(),
            settle_ms: default_quiet_ms(),
            capture_selector: default_capture_selector(),
            chrome_executable: None,
            browser_args: Vec::new(),
            default_ttl_secs: default_ttl_secs(),
            min_ttl_secs: default_min_ttl_secs(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn min_ttl(&self) -> Duration {
        Duration::from_secs(self.min_ttl_secs)
    }

    /// Sweep interval, or `None` when the background sweep is disabled.
    pub fn purge_interval(&self) -> Option<Duration> {
        (self.purge_interval_secs > 0).then(|| Duration::from_secs(self.purge_interval_secs))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SNAPEMBED_`
    /// 2. TOML file from `SNAPEMBED_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SNAPEMBED_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SNAPEMBED_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8787");
        assert_eq!(config.db_path, PathBuf::from("./snapembed-cache.sqlite"));
        assert_eq!(config.user_agent, "snapembed/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert!(config.render_enabled);
        assert_eq!((config.viewport_width, config.viewport_height), (600, 600));
        assert_eq!(config.network_idle_ms, 1_000);
        assert_eq!(config.settle_ms, 1_000);
        assert_eq!(config.capture_selector, "body div");
        assert_eq!(config.default_ttl_secs, 14_400);
        assert_eq!(config.min_ttl_secs, 60);
        assert!(config.chrome_executable.is_none());
        assert!(config.browser_args.is_empty());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.render_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.min_ttl(), Duration::from_secs(60));
        assert_eq!(config.default_ttl(), Duration::from_secs(14_400));
    }

    #[test]
    fn test_purge_interval_disabled() {
        let config = AppConfig { purge_interval_secs: 0, ..Default::default() };
        assert_eq!(config.purge_interval(), None);
        assert_eq!(AppConfig::default().purge_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_load_from_env_and_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("snapembed.toml", "min_ttl_secs = 120\nviewport_width = 800\n")?;
            jail.set_env("SNAPEMBED_CONFIG_FILE", "snapembed.toml");
            jail.set_env("SNAPEMBED_VIEWPORT_WIDTH", "1024");
            jail.set_env("SNAPEMBED_RENDER_ENABLED", "false");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.min_ttl_secs, 120);
            assert_eq!(config.viewport_width, 1024);
            assert!(!config.render_enabled);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SNAPEMBED_MIN_TTL_SECS", "0");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { .. })));
            Ok(())
        });
    }
}
