//! Application configuration loaded from environment variables.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Coordinator ===
    /// Base URL of the reservation coordinator RPC endpoint.
    pub coordinator_url: String,

    /// WebSocket URL for the reservation change feed.
    pub feed_ws_url: String,

    /// Tenant (workspace) id; every reservation and feed subscription is
    /// scoped to it.
    pub tenant_id: String,

    // === Reservation Parameters ===
    /// Currency code attached to reservations.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Debounce interval for stake edits, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    // === HTTP Client ===
    /// RPC request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Connection pool size per host.
    #[serde(default = "default_http_pool_size")]
    pub http_pool_size: usize,

    // === Change Feed ===
    /// Maximum reconnect backoff delay in seconds.
    #[serde(default = "default_ws_max_delay")]
    pub ws_reconnect_max_delay_s: u64,

    /// Heartbeat interval in seconds; twice this without a message marks
    /// the connection stale.
    #[serde(default = "default_ws_heartbeat")]
    pub ws_heartbeat_interval_s: u64,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_currency() -> String {
    "BRL".to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_http_timeout_ms() -> u64 {
    2000
}

fn default_http_pool_size() -> usize {
    10
}

fn default_ws_max_delay() -> u64 {
    30
}

fn default_ws_heartbeat() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.coordinator_url.starts_with("http") {
            return Err("COORDINATOR_URL must be an http(s) URL".to_string());
        }

        if !self.feed_ws_url.starts_with("ws") {
            return Err("FEED_WS_URL must be a ws(s) URL".to_string());
        }

        if self.tenant_id.trim().is_empty() {
            return Err("TENANT_ID is required".to_string());
        }

        if self.debounce_ms == 0 {
            return Err("DEBOUNCE_MS must be at least 1".to_string());
        }

        Ok(())
    }

    /// Debounce interval as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
