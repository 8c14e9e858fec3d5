// =============================================================================
// Runtime configuration — env/file driven, falls back to documented defaults
// =============================================================================
//
// Modeled on the teacher's `RuntimeConfig::load`: every tunable lives here,
// every field carries a default so an older or partial config file never
// fails to load.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::rpc::circuit_breaker::CircuitBreakerConfig;
use crate::rpc::retry::RetryConfig;

fn default_base_url() -> String {
    "http://localhost:8000".into()
}

fn default_pool_size() -> usize {
    10
}

fn default_cache_url() -> Option<String> {
    None
}

fn default_alert_poll_interval_secs() -> u64 {
    60
}

fn default_anti_fatigue_window_secs() -> i64 {
    15 * 60
}

fn default_anti_fatigue_max() -> usize {
    5
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self { base_url: default_base_url(), token: None, pool_size: default_pool_size() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_search")]
    pub search_per_min: u32,
    #[serde(default = "RateLimitConfig::default_price")]
    pub price_per_min: u32,
    #[serde(default = "RateLimitConfig::default_historical")]
    pub historical_per_min: u32,
    #[serde(default = "RateLimitConfig::default_alert_write")]
    pub alert_write_per_min: u32,
    #[serde(default = "RateLimitConfig::default_notifications_list")]
    pub notifications_list_per_min: u32,
    #[serde(default = "RateLimitConfig::default_market_overview")]
    pub market_overview_per_min: u32,
}

impl RateLimitConfig {
    fn default_search() -> u32 {
        60
    }
    fn default_price() -> u32 {
        120
    }
    fn default_historical() -> u32 {
        30
    }
    fn default_alert_write() -> u32 {
        30
    }
    fn default_notifications_list() -> u32 {
        60
    }
    fn default_market_overview() -> u32 {
        30
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            search_per_min: Self::default_search(),
            price_per_min: Self::default_price(),
            historical_per_min: Self::default_historical(),
            alert_write_per_min: Self::default_alert_write(),
            notifications_list_per_min: Self::default_notifications_list(),
            market_overview_per_min: Self::default_market_overview(),
        }
    }
}

/// Top-level service configuration. Every field has a serde default so a
/// partial config file (or none at all) still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub stock_data_server: ToolServerConfig,
    #[serde(default)]
    pub news_server: ToolServerConfig,
    #[serde(default)]
    pub market_data_server: ToolServerConfig,

    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Redis URL; when absent the in-memory cache store is used instead.
    #[serde(default = "default_cache_url")]
    pub cache_url: Option<String>,

    #[serde(default = "default_alert_poll_interval_secs")]
    pub alert_poll_interval_secs: u64,
    #[serde(default = "default_anti_fatigue_window_secs")]
    pub anti_fatigue_window_secs: i64,
    #[serde(default = "default_anti_fatigue_max")]
    pub anti_fatigue_max_per_window: usize,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            stock_data_server: ToolServerConfig::default(),
            news_server: ToolServerConfig::default(),
            market_data_server: ToolServerConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache_url: default_cache_url(),
            alert_poll_interval_secs: default_alert_poll_interval_secs(),
            anti_fatigue_window_secs: default_anti_fatigue_window_secs(),
            anti_fatigue_max_per_window: default_anti_fatigue_max(),
            rate_limits: RateLimitConfig::default(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl ServiceConfig {
    /// Load from a JSON file; falls back to env-var overlay + defaults if
    /// the file is missing or unparsable, logging the fallback.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut config = match Self::load_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to load service config, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read service config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse service config from {}", path.display()))?;
        info!(path = %path.display(), "service config loaded");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("STOCK_DATA_SERVER_URL") {
            self.stock_data_server.base_url = url;
        }
        if let Ok(url) = std::env::var("NEWS_SERVER_URL") {
            self.news_server.base_url = url;
        }
        if let Ok(url) = std::env::var("MARKET_DATA_SERVER_URL") {
            self.market_data_server.base_url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.cache_url = Some(url);
        }
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            self.bind_addr = addr;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.rate_limits.search_per_min, 60);
        assert_eq!(cfg.rate_limits.price_per_min, 120);
        assert_eq!(cfg.anti_fatigue_max_per_window, 5);
        assert_eq!(cfg.anti_fatigue_window_secs, 900);
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.alert_poll_interval_secs, 60);
        assert!(cfg.cache_url.is_none());
    }
}
