//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Request URL → route.rs (derive scheme/host/port key)
//!     → connection.rs (acquire):
//!         - reuse idle connection for the route, or
//!         - open a new one while route + global caps have headroom, or
//!         - block (pending) until a release or the acquire timeout
//!     → ConnectionLease handed to the exchange
//!     → lease drop returns the connection (or destroys it if discarded)
//! ```
//!
//! # Design Decisions
//! - The pool is the only shared mutable resource; one mutex guards it and
//!   no await runs while the lock is held
//! - Release is drop-based so streaming responses extend the lease for the
//!   lifetime of the body and cannot leak on early return
//! - Idle connections are evicted lazily at acquire time, not by a
//!   background task

pub mod connection;
pub mod route;

pub use connection::{ConnectionLease, ConnectionPool, PoolConfig, PoolError, PoolStats};
pub use route::Route;
