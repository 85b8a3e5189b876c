//! Pooled HTTP exchange client.
//!
//! Issues generic API requests through a bounded, route-keyed connection
//! pool, exposes pool occupancy as named gauges, optionally gzip-compresses
//! outgoing bodies, and supports buffered and streaming response modes
//! without leaking connections.

pub mod client;
pub mod config;
pub mod http;
pub mod observability;
pub mod pool;
pub mod registry;

pub use client::{ExchangeClient, ExchangeError};
pub use config::ClientConfig;
pub use http::{ApiRequest, ApiResponse, BodyStream, ResponseBody};
pub use observability::{MetricsSink, PoolMetricsBinder, SharedMetricsSink};
pub use pool::{ConnectionPool, PoolStats, Route};
pub use registry::{ComponentLookup, ComponentRegistry};

pub use hyper::{Method, StatusCode};
