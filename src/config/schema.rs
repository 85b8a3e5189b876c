//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for an exchange
//! client. All types derive Serde traits for deserialization from config
//! files, and every field has a default so a minimal config is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for one exchange client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client name, used as the name segment of this client's pool gauges.
    /// Must be unique per process when multiple clients register metrics
    /// into the same sink.
    pub name: String,

    /// Overall timeout for a buffered exchange, in milliseconds.
    pub request_timeout_ms: u64,

    /// Inject `Content-Type: application/json` and `Accept:
    /// application/json` when the caller set neither.
    pub default_headers_json: bool,

    /// Connection pool settings.
    pub pool: PoolSettings,

    /// Outgoing body compression settings.
    pub compression: CompressionSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "exchange-client".to_string(),
            request_timeout_ms: 10_000,
            default_headers_json: true,
            pool: PoolSettings::default(),
            compression: CompressionSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Overall request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of pooled connections across all routes.
    pub max_total: usize,

    /// Default maximum number of pooled connections per route.
    pub max_per_route: usize,

    /// How long an acquire may block waiting for a free connection, in
    /// milliseconds, before failing with a pool-exhausted error.
    pub acquire_timeout_ms: u64,

    /// TCP connect timeout, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Keep-alive window: idle connections older than this are evicted
    /// lazily at acquire time, in milliseconds.
    pub idle_timeout_ms: u64,

    /// Per-route cap overrides. A route matching `host:port` uses `max`
    /// instead of `max_per_route`.
    pub route_overrides: Vec<RouteMaxSettings>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_total: 25,
            max_per_route: 5,
            acquire_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
            idle_timeout_ms: 90_000,
            route_overrides: Vec::new(),
        }
    }
}

/// Per-route connection cap override.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteMaxSettings {
    /// Route host.
    pub host: String,

    /// Route port.
    pub port: u16,

    /// Maximum pooled connections for this route.
    pub max: usize,
}

/// Outgoing body compression settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CompressionSettings {
    /// Gzip-compress outgoing request bodies. Individual requests can opt
    /// out with the `Skip-Compression` header.
    pub gzip: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.pool.max_total, 25);
        assert_eq!(config.pool.max_per_route, 5);
        assert!(!config.compression.gzip);
        assert!(config.default_headers_json);
        assert_eq!(config.request_timeout(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_minimal_toml() {
        let config: ClientConfig = toml::from_str("name = \"orders\"").unwrap();
        assert_eq!(config.name, "orders");
        assert_eq!(config.pool.max_total, 25);
    }

    #[test]
    fn test_route_override_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            [pool]
            max_total = 50

            [[pool.route_overrides]]
            host = "api.example.com"
            port = 8080
            max = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.max_total, 50);
        assert_eq!(config.pool.route_overrides.len(), 1);
        assert_eq!(config.pool.route_overrides[0].max, 20);
    }
}
