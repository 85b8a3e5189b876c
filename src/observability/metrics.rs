//! Connection pool metrics.
//!
//! # Responsibilities
//! - Define the metrics sink capability (named, pull-based gauges)
//! - Bind the five pool occupancy gauges for a named client
//! - Keep gauge names stable for dashboard compatibility
//!
//! # Metrics
//! - `httpcomponents.httpclient.<clientName>.pool.total.max`
//! - `httpcomponents.httpclient.<clientName>.pool.total.connections.available`
//! - `httpcomponents.httpclient.<clientName>.pool.total.connections.leased`
//! - `httpcomponents.httpclient.<clientName>.pool.total.pending`
//! - `httpcomponents.httpclient.<clientName>.pool.route.max.default`
//!
//! # Design Decisions
//! - Gauges are sampling closures over live [`ConnectionPool::stats`];
//!   no push thread exists, the sink polls on its own schedule
//! - Registration is idempotent per gauge name, so re-binding a client
//!   name does not duplicate gauges

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::pool::ConnectionPool;

/// Metric name prefix shared by all pool gauges.
pub const METRIC_HTTP_CLIENT_PREFIX: &str = "httpcomponents.httpclient";

/// A pull-based gauge sampler.
pub type GaugeSampler = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Capability accepted from the host: a sink for named gauges.
///
/// Implementations must be idempotent per gauge name: registering a name
/// twice keeps the first registration.
pub trait MetricsSink: Send + Sync {
    /// Register a gauge with a name, a description and a sampling closure.
    fn register_gauge(&self, name: &str, description: &str, sampler: GaugeSampler);
}

/// Registry wrapper for handing a [`MetricsSink`] to a client through a
/// component registry.
#[derive(Clone)]
pub struct SharedMetricsSink(pub Arc<dyn MetricsSink>);

/// Binds connection pool occupancy gauges for one named client.
pub struct PoolMetricsBinder {
    pool: ConnectionPool,
    client_name: String,
}

impl PoolMetricsBinder {
    pub fn new(pool: ConnectionPool, client_name: impl Into<String>) -> Self {
        Self {
            pool,
            client_name: client_name.into(),
        }
    }

    /// Register the five pool gauges with the sink. Safe to call more than
    /// once for the same client name; sinks keep the first registration.
    pub fn bind(&self, sink: &dyn MetricsSink) {
        debug!(client = %self.client_name, "Binding connection pool gauges");

        self.gauge(sink, "pool.total.max",
            "The configured maximum number of allowed persistent connections for all routes.",
            |stats| stats.max_total as f64);
        self.gauge(sink, "pool.total.connections.available",
            "The number of persistent and available connections for all routes.",
            |stats| stats.available as f64);
        self.gauge(sink, "pool.total.connections.leased",
            "The number of persistent and leased connections for all routes.",
            |stats| stats.leased as f64);
        self.gauge(sink, "pool.total.pending",
            "The number of connection requests being blocked awaiting a free connection for all routes.",
            |stats| stats.pending as f64);
        self.gauge(sink, "pool.route.max.default",
            "The configured default maximum number of allowed persistent connections per route.",
            |stats| stats.default_max_per_route as f64);
    }

    fn gauge(
        &self,
        sink: &dyn MetricsSink,
        suffix: &str,
        description: &str,
        sample: fn(crate::pool::PoolStats) -> f64,
    ) {
        let name = metric_name(&self.client_name, suffix);
        let pool = self.pool.clone();
        sink.register_gauge(&name, description, Arc::new(move || sample(pool.stats())));
    }
}

/// Full gauge name for a client and metric suffix.
pub fn metric_name(client_name: &str, suffix: &str) -> String {
    format!("{}.{}.{}", METRIC_HTTP_CLIENT_PREFIX, client_name, suffix)
}

/// In-memory sink: stores samplers so hosts and tests can read gauges
/// directly.
#[derive(Default)]
pub struct InMemoryMetricsSink {
    gauges: Mutex<HashMap<String, (String, GaugeSampler)>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample a gauge by full name.
    pub fn sample(&self, name: &str) -> Option<f64> {
        let gauges = self.lock();
        gauges.get(name).map(|(_, sampler)| sampler())
    }

    /// All registered gauge names, sorted.
    pub fn names(&self) -> Vec<String> {
        let gauges = self.lock();
        let mut names: Vec<_> = gauges.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, GaugeSampler)>> {
        match self.gauges.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn register_gauge(&self, name: &str, description: &str, sampler: GaugeSampler) {
        let mut gauges = self.lock();
        if gauges.contains_key(name) {
            debug!(gauge = %name, "Gauge already registered, keeping first registration");
            return;
        }
        gauges.insert(name.to_string(), (description.to_string(), sampler));
    }
}

/// Sink adapter over the `metrics` crate facade.
///
/// Registration describes the gauge once; [`FacadeMetricsSink::flush`]
/// pushes current samples through the facade, to be called on the host
/// exporter's schedule.
#[derive(Default)]
pub struct FacadeMetricsSink {
    samplers: Mutex<HashMap<String, GaugeSampler>>,
}

impl FacadeMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the current sample of every registered gauge into the facade.
    pub fn flush(&self) {
        let samplers = self.lock();
        for (name, sampler) in samplers.iter() {
            metrics::gauge!(name.clone()).set(sampler());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, GaugeSampler>> {
        match self.samplers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MetricsSink for FacadeMetricsSink {
    fn register_gauge(&self, name: &str, description: &str, sampler: GaugeSampler) {
        let mut samplers = self.lock();
        if samplers.contains_key(name) {
            return;
        }
        metrics::describe_gauge!(name.to_string(), description.to_string());
        samplers.insert(name.to_string(), sampler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;

    #[test]
    fn test_gauge_names_match_dashboard_contract() {
        let pool = ConnectionPool::new(PoolConfig::default());
        let sink = InMemoryMetricsSink::new();
        PoolMetricsBinder::new(pool, "orders").bind(&sink);

        assert_eq!(
            sink.names(),
            vec![
                "httpcomponents.httpclient.orders.pool.route.max.default",
                "httpcomponents.httpclient.orders.pool.total.connections.available",
                "httpcomponents.httpclient.orders.pool.total.connections.leased",
                "httpcomponents.httpclient.orders.pool.total.max",
                "httpcomponents.httpclient.orders.pool.total.pending",
            ]
        );
    }

    #[test]
    fn test_gauges_sample_live_stats() {
        let mut config = PoolConfig::default();
        config.max_total = 42;
        config.default_max_per_route = 9;
        let pool = ConnectionPool::new(config);
        let sink = InMemoryMetricsSink::new();
        PoolMetricsBinder::new(pool, "orders").bind(&sink);

        assert_eq!(sink.sample("httpcomponents.httpclient.orders.pool.total.max"), Some(42.0));
        assert_eq!(sink.sample("httpcomponents.httpclient.orders.pool.route.max.default"), Some(9.0));
        assert_eq!(sink.sample("httpcomponents.httpclient.orders.pool.total.pending"), Some(0.0));
    }

    #[test]
    fn test_rebind_does_not_duplicate() {
        let pool = ConnectionPool::new(PoolConfig::default());
        let sink = InMemoryMetricsSink::new();
        let binder = PoolMetricsBinder::new(pool, "orders");
        binder.bind(&sink);
        binder.bind(&sink);

        assert_eq!(sink.names().len(), 5);
    }
}
