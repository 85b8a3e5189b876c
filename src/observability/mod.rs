//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectionPool::stats() (atomic counter snapshot)
//!     → metrics.rs (named gauges with sampling closures)
//!     → MetricsSink (host-provided; polls on its own schedule)
//!
//! All modules emit structured log events through tracing; the host owns
//! the subscriber.
//! ```
//!
//! # Design Decisions
//! - Gauges are pull-based sampling closures; observation never mutates
//!   pool state
//! - Gauge names are a stable dashboard contract

pub mod metrics;

pub use metrics::{
    metric_name, FacadeMetricsSink, GaugeSampler, InMemoryMetricsSink, MetricsSink,
    PoolMetricsBinder, SharedMetricsSink, METRIC_HTTP_CLIENT_PREFIX,
};
