//! Bounded, route-keyed connection pooling.
//!
//! This module provides a shared HTTP/1.1 connection pool with:
//! - A global cap and a per-route cap (overridable per route)
//! - Blocking acquire with a configurable timeout and a pending counter
//! - Lazy eviction of idle connections past the keep-alive window
//! - Drop-based release through [`ConnectionLease`]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::schema::PoolSettings;
use crate::pool::route::Route;

/// Error types for connection pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to connect to {route}: {reason}")]
    ConnectionFailed { route: String, reason: String },

    #[error("pool exhausted for route {0}: no connection became available in time")]
    Exhausted(String),

    #[error("pool is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP handshake failed: {0}")]
    Handshake(#[from] hyper::Error),
}

/// Runtime configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections across all routes.
    pub max_total: usize,

    /// Default maximum number of connections per route.
    pub default_max_per_route: usize,

    /// How long an acquire may block before failing with [`PoolError::Exhausted`].
    pub acquire_timeout: Duration,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Keep-alive window for idle connections.
    pub idle_timeout: Duration,

    /// Per-route cap overrides, keyed by `(host, port)`.
    pub route_overrides: HashMap<(String, u16), usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 25,
            default_max_per_route: 5,
            acquire_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(90),
            route_overrides: HashMap::new(),
        }
    }
}

impl PoolConfig {
    /// Build the runtime pool configuration from deserialized settings.
    pub fn from_settings(settings: &PoolSettings) -> Self {
        let route_overrides = settings
            .route_overrides
            .iter()
            .map(|o| ((o.host.clone(), o.port), o.max))
            .collect();
        Self {
            max_total: settings.max_total,
            default_max_per_route: settings.max_per_route,
            acquire_timeout: Duration::from_millis(settings.acquire_timeout_ms),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            idle_timeout: Duration::from_millis(settings.idle_timeout_ms),
            route_overrides,
        }
    }

    /// Effective connection cap for a route.
    pub fn max_for_route(&self, route: &Route) -> usize {
        self.route_overrides
            .get(&(route.host().to_string(), route.port()))
            .copied()
            .unwrap_or(self.default_max_per_route)
    }
}

/// Point-in-time snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Configured maximum connections across all routes.
    pub max_total: usize,

    /// Idle connections available for reuse.
    pub available: usize,

    /// Connections currently checked out to in-flight exchanges.
    pub leased: usize,

    /// Callers blocked waiting for a free connection.
    pub pending: usize,

    /// Configured default per-route cap.
    pub default_max_per_route: usize,
}

/// A pooled HTTP/1.1 connection.
pub struct PooledConnection {
    /// The request sender half of the connection.
    sender: http1::SendRequest<Full<Bytes>>,

    /// Last time the connection was handed out or returned.
    last_used: Instant,

    /// Connection creation time.
    created_at: Instant,
}

impl PooledConnection {
    /// Open a new connection to the route's authority.
    async fn open(route: &Route, connect_timeout: Duration) -> Result<Self, PoolError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(route.authority()))
            .await
            .map_err(|_| PoolError::ConnectionFailed {
                route: route.to_string(),
                reason: "connect timed out".to_string(),
            })?
            .map_err(|e| PoolError::ConnectionFailed {
                route: route.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;

        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;

        // Drive the connection until it closes.
        let route_name = route.to_string();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(route = %route_name, error = %e, "Connection terminated with error");
            }
        });

        let now = Instant::now();
        Ok(Self {
            sender,
            last_used: now,
            created_at: now,
        })
    }

    /// Whether an idle connection can still be handed out.
    fn is_usable(&self, max_idle: Duration) -> bool {
        !self.sender.is_closed() && self.sender.is_ready() && self.last_used.elapsed() < max_idle
    }

    /// Whether a returned connection is worth keeping. Readiness is not
    /// checked here; it may lag the dispatcher briefly and is re-checked
    /// before the connection is handed out again.
    fn is_reusable(&self) -> bool {
        !self.sender.is_closed()
    }

    fn mark_used(&mut self) {
        self.last_used = Instant::now();
    }
}

/// Outcome of a single non-blocking acquire attempt.
enum Acquire {
    /// An idle connection was handed out.
    Reuse(PooledConnection),
    /// A slot was reserved; the caller must open a connection.
    OpenSlot,
    /// Both caps are binding; the caller must wait for a release.
    Wait,
    /// The pool has been closed.
    Closed,
}

/// Mutable pool state, guarded by one mutex. No await happens while the
/// lock is held; connects run outside against a reserved slot.
struct PoolInner {
    /// Idle connections per route, most recently used at the back.
    idle: HashMap<Route, VecDeque<PooledConnection>>,

    /// Total idle connections across all routes.
    idle_count: usize,

    /// Total leased connections (including slots reserved for in-flight opens).
    leased_total: usize,

    /// Leased connections per route.
    leased_per_route: HashMap<Route, usize>,

    /// Set once the pool is closed; acquires fail afterwards.
    closed: bool,
}

impl PoolInner {
    /// Drop the least recently used idle connection, from any route, to
    /// make room under the global cap. Returns false when nothing is idle.
    fn evict_lru_idle(&mut self) -> bool {
        let victim = self
            .idle
            .iter()
            .filter_map(|(route, queue)| queue.front().map(|c| (route.clone(), c.last_used)))
            .min_by_key(|(_, last_used)| *last_used)
            .map(|(route, _)| route);

        match victim {
            Some(route) => {
                if let Some(queue) = self.idle.get_mut(&route) {
                    queue.pop_front();
                    self.idle_count -= 1;
                    if queue.is_empty() {
                        self.idle.remove(&route);
                    }
                    debug!(route = %route, "Evicted idle connection to free a global slot");
                }
                true
            }
            None => false,
        }
    }
}

/// State shared between the pool handle and outstanding leases.
struct PoolShared {
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    /// Signalled on every release so one waiter can retry.
    released: Notify,
    /// Callers currently blocked in acquire.
    pending: AtomicUsize,
}

impl PoolShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        // Lock poisoning only happens if a holder panicked; the state is
        // plain counters and queues, safe to keep using.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// One non-blocking acquire attempt.
    fn try_acquire(&self, route: &Route) -> Acquire {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.closed {
            return Acquire::Closed;
        }

        // Reuse an idle connection for this route, lazily evicting any
        // that sat past the keep-alive window.
        loop {
            let conn = match inner.idle.get_mut(route) {
                Some(queue) => queue.pop_front(),
                None => None,
            };
            let Some(conn) = conn else { break };
            inner.idle_count -= 1;
            if conn.is_usable(self.config.idle_timeout) {
                inner.leased_total += 1;
                *inner.leased_per_route.entry(route.clone()).or_insert(0) += 1;
                return Acquire::Reuse(conn);
            }
            debug!(route = %route, age_secs = conn.created_at.elapsed().as_secs(), "Evicting stale idle connection");
        }
        if inner.idle.get(route).is_some_and(|q| q.is_empty()) {
            inner.idle.remove(route);
        }

        // No idle connection for this route; open a new one if both caps
        // have headroom.
        let route_leased = inner.leased_per_route.get(route).copied().unwrap_or(0);
        if route_leased >= self.config.max_for_route(route) {
            return Acquire::Wait;
        }
        if inner.leased_total + inner.idle_count >= self.config.max_total
            && !inner.evict_lru_idle()
        {
            return Acquire::Wait;
        }

        // Reserve the slot; the caller opens the connection outside the lock.
        inner.leased_total += 1;
        *inner.leased_per_route.entry(route.clone()).or_insert(0) += 1;
        Acquire::OpenSlot
    }

    /// Undo a slot reservation after a failed connect.
    fn cancel_reservation(&self, route: &Route) {
        self.decrement_lease(route);
        self.released.notify_one();
    }

    /// Return a connection to the pool. `conn` is `None` when the lease
    /// was discarded; the counters are restored either way.
    fn release(&self, route: &Route, conn: Option<PooledConnection>) {
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.leased_total = inner.leased_total.saturating_sub(1);
            match inner.leased_per_route.get_mut(route) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    inner.leased_per_route.remove(route);
                }
                None => {}
            }
            if !inner.closed {
                if let Some(mut conn) = conn {
                    if conn.is_reusable() {
                        conn.last_used = Instant::now();
                        inner.idle.entry(route.clone()).or_default().push_back(conn);
                        inner.idle_count += 1;
                    }
                }
            }
        }
        self.released.notify_one();
    }

    fn decrement_lease(&self, route: &Route) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.leased_total = inner.leased_total.saturating_sub(1);
        match inner.leased_per_route.get_mut(route) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                inner.leased_per_route.remove(route);
            }
            None => {}
        }
    }
}

/// Counts a caller as pending for the lifetime of its wait, including
/// cancellation, so the gauge never drifts.
struct PendingGuard {
    shared: Arc<PoolShared>,
}

impl PendingGuard {
    fn new(shared: Arc<PoolShared>) -> Self {
        shared.pending.fetch_add(1, Ordering::Relaxed);
        Self { shared }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.shared.pending.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Bounded connection pool shared by all exchanges of one client.
///
/// Clone is cheap - clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a new pool with the given configuration.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                inner: Mutex::new(PoolInner {
                    idle: HashMap::new(),
                    idle_count: 0,
                    leased_total: 0,
                    leased_per_route: HashMap::new(),
                    closed: false,
                }),
                released: Notify::new(),
                pending: AtomicUsize::new(0),
            }),
        }
    }

    /// Check out a connection for the route.
    ///
    /// Reuses an idle connection when one exists, opens a new one while the
    /// route and global caps have headroom, and otherwise blocks until a
    /// release or the acquire timeout. Timeout surfaces as
    /// [`PoolError::Exhausted`]; a stale connection is never handed out.
    pub async fn acquire(&self, route: &Route) -> Result<ConnectionLease, PoolError> {
        let deadline = Instant::now() + self.shared.config.acquire_timeout;
        let mut pending_guard: Option<PendingGuard> = None;

        loop {
            // Register for release notifications before checking state so a
            // release between the check and the wait is not lost.
            let released = self.shared.released.notified();

            match self.shared.try_acquire(route) {
                Acquire::Reuse(mut conn) => {
                    conn.mark_used();
                    debug!(route = %route, "Reusing pooled connection");
                    return Ok(self.lease(route.clone(), conn));
                }
                Acquire::OpenSlot => {
                    match PooledConnection::open(route, self.shared.config.connect_timeout).await {
                        Ok(conn) => {
                            debug!(route = %route, "Opened new pooled connection");
                            return Ok(self.lease(route.clone(), conn));
                        }
                        Err(e) => {
                            warn!(route = %route, error = %e, "Failed to open connection");
                            self.shared.cancel_reservation(route);
                            return Err(e);
                        }
                    }
                }
                Acquire::Wait => {
                    if pending_guard.is_none() {
                        pending_guard = Some(PendingGuard::new(Arc::clone(&self.shared)));
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(route = %route, timeout = ?self.shared.config.acquire_timeout, "Pool exhausted");
                        return Err(PoolError::Exhausted(route.to_string()));
                    }
                    // Wake on the next release or keep waiting until the
                    // deadline; either way the loop re-checks the pool.
                    let _ = tokio::time::timeout(deadline - now, released).await;
                }
                Acquire::Closed => return Err(PoolError::Closed),
            }
        }
    }

    /// Sample current pool occupancy.
    pub fn stats(&self) -> PoolStats {
        let guard = self.shared.lock();
        PoolStats {
            max_total: self.shared.config.max_total,
            available: guard.idle_count,
            leased: guard.leased_total,
            pending: self.shared.pending.load(Ordering::Relaxed),
            default_max_per_route: self.shared.config.default_max_per_route,
        }
    }

    /// Close the pool: drop all idle connections and fail later acquires.
    /// Outstanding leases stay valid until dropped.
    pub fn close(&self) {
        let mut guard = self.shared.lock();
        guard.closed = true;
        guard.idle.clear();
        guard.idle_count = 0;
        drop(guard);
        self.shared.released.notify_waiters();
    }

    fn lease(&self, route: Route, conn: PooledConnection) -> ConnectionLease {
        ConnectionLease {
            shared: Arc::clone(&self.shared),
            route,
            conn: Some(conn),
            reusable: true,
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ConnectionPool")
            .field("max_total", &stats.max_total)
            .field("available", &stats.available)
            .field("leased", &stats.leased)
            .field("pending", &stats.pending)
            .finish()
    }
}

/// A checked-out connection. Returns itself to the pool on drop; exactly
/// one release happens per successful acquire.
pub struct ConnectionLease {
    shared: Arc<PoolShared>,
    route: Route,
    conn: Option<PooledConnection>,
    reusable: bool,
}

impl ConnectionLease {
    /// The route this lease belongs to.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Access the request sender. Marks the connection as used.
    pub fn sender(&mut self) -> &mut http1::SendRequest<Full<Bytes>> {
        let conn = self.conn.as_mut().expect("lease accessed after release");
        conn.mark_used();
        &mut conn.sender
    }

    /// Mark the connection as unusable; it is destroyed instead of pooled
    /// when the lease drops.
    pub fn discard(&mut self) {
        self.reusable = false;
    }

    /// Mark the connection as cleanly drained and safe to pool again.
    pub fn mark_reusable(&mut self) {
        self.reusable = true;
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let conn = if self.reusable { self.conn.take() } else { None };
        self.shared.release(&self.route, conn);
    }
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("route", &self.route)
            .field("reusable", &self.reusable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PoolSettings, RouteMaxSettings};

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_total, 25);
        assert_eq!(config.default_max_per_route, 5);
        assert_eq!(config.idle_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_route_override_wins_over_default() {
        let settings = PoolSettings {
            max_per_route: 2,
            route_overrides: vec![RouteMaxSettings {
                host: "api.example.com".into(),
                port: 8080,
                max: 7,
            }],
            ..PoolSettings::default()
        };
        let config = PoolConfig::from_settings(&settings);

        let overridden = Route::new("http", "api.example.com", 8080);
        let plain = Route::new("http", "api.example.com", 9090);
        assert_eq!(config.max_for_route(&overridden), 7);
        assert_eq!(config.max_for_route(&plain), 2);
    }

    #[test]
    fn test_stats_on_fresh_pool() {
        let pool = ConnectionPool::new(PoolConfig::default());
        let stats = pool.stats();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.available, 0);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.max_total, 25);
        assert_eq!(stats.default_max_per_route, 5);
    }

    #[tokio::test]
    async fn test_acquire_fails_fast_on_closed_pool() {
        let pool = ConnectionPool::new(PoolConfig::default());
        pool.close();
        let route = Route::new("http", "127.0.0.1", 1);
        match pool.acquire(&route).await {
            Err(PoolError::Closed) => {}
            other => panic!("expected Closed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connect_failure_restores_counters() {
        // Nothing listens on this port; the connect must fail and leave no
        // leased slot behind.
        let mut config = PoolConfig::default();
        config.connect_timeout = Duration::from_millis(200);
        let pool = ConnectionPool::new(config);
        let route = Route::new("http", "127.0.0.1", 1);

        let result = pool.acquire(&route).await;
        assert!(matches!(result, Err(PoolError::ConnectionFailed { .. })));

        let stats = pool.stats();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.available, 0);
    }
}
