//! Connection and analysis settings
//!
//! Settings are an immutable value handed to each component at construction.
//! Reconfiguring means building a new `AnalysisService` from new settings.

use crate::error::CoreError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest accepted cache or token lifetime (30 days)
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Deadline `ttl` from now, capped at [`MAX_TTL_SECS`]
pub(crate) fn expiry_from_now(ttl: Duration) -> tokio::time::Instant {
    tokio::time::Instant::now() + ttl.min(Duration::from_secs(MAX_TTL_SECS))
}

/// Longest accepted first backoff delay (10 minutes)
pub const MAX_RETRY_BASE_DELAY_MS: u64 = 10 * 60 * 1000;

/// Settings for the FTP pool, caches and token store
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    /// Passive (PASV) data connections
    pub passive: bool,
    /// Explicit FTPS (AUTH TLS) on the control channel
    pub use_tls: bool,
    pub max_connections: usize,
    pub connect_timeout_secs: u64,
    /// Read timeout on the control socket, 0 disables it
    pub data_timeout_secs: u64,
    /// Transfer chunk size in bytes
    pub chunk_size: usize,
    pub cache_ttl_secs: u64,
    pub listing_cache_capacity: usize,
    pub content_cache_size: usize,
    pub token_ttl_secs: u64,
    pub allowed_machines: u32,
    /// First backoff delay, doubled after each failed attempt
    pub retry_base_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "192.168.105.244".to_string(),
            user: "fanuc".to_string(),
            password: "fanuc_ftp".to_string(),
            port: 21,
            passive: true,
            use_tls: false,
            max_connections: 4,
            connect_timeout_secs: 10,
            data_timeout_secs: 0,
            chunk_size: 64 * 1024,
            cache_ttl_secs: 300,
            listing_cache_capacity: 128,
            content_cache_size: 64,
            token_ttl_secs: 300,
            allowed_machines: 50,
            retry_base_delay_ms: 1000,
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .field("passive", &self.passive)
            .field("use_tls", &self.use_tls)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("data_timeout_secs", &self.data_timeout_secs)
            .field("chunk_size", &self.chunk_size)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("listing_cache_capacity", &self.listing_cache_capacity)
            .field("content_cache_size", &self.content_cache_size)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("allowed_machines", &self.allowed_machines)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .finish()
    }
}

impl Settings {
    /// Load settings from a TOML file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pool or caches cannot work with
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |message: &str| {
            Err(CoreError::InvalidConfig {
                message: message.to_string(),
            })
        };

        if self.host.trim().is_empty() {
            return invalid("host must not be empty");
        }
        if self.max_connections == 0 {
            return invalid("max_connections must be at least 1");
        }
        if self.chunk_size == 0 {
            return invalid("chunk_size must be at least 1 byte");
        }
        if self.allowed_machines == 0 {
            return invalid("allowed_machines must be at least 1");
        }
        if self.listing_cache_capacity == 0 || self.content_cache_size == 0 {
            return invalid("cache capacities must be at least 1");
        }
        if self.cache_ttl_secs > MAX_TTL_SECS || self.token_ttl_secs > MAX_TTL_SECS {
            return invalid("cache_ttl_secs and token_ttl_secs must not exceed 30 days");
        }
        if self.connect_timeout_secs > MAX_TTL_SECS || self.data_timeout_secs > MAX_TTL_SECS {
            return invalid("timeouts must not exceed 30 days");
        }
        if self.retry_base_delay_ms > MAX_RETRY_BASE_DELAY_MS {
            return invalid("retry_base_delay_ms must not exceed 10 minutes");
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn data_timeout(&self) -> Option<Duration> {
        (self.data_timeout_secs > 0).then(|| Duration::from_secs(self.data_timeout_secs))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}
