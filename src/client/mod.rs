//! Exchange client subsystem.
//!
//! # Data Flow
//! ```text
//! ApiRequest
//!     → exchange.rs (encode URL, default headers, serialize body)
//!     → compression interceptor (if enabled)
//!     → pool acquire → transport call
//!     → buffered: collect body → release → resolver.rs (deserialize)
//!     → streaming: BodyStream keeps the lease until dropped/drained
//! ```
//!
//! # Design Decisions
//! - One shared resolver/codec per client keeps deserialization options
//!   consistent across every request the client issues
//! - Buffered transport faults propagate; streaming-open faults degrade
//!   to a 500 status response (documented default, see DESIGN.md)

pub mod exchange;
pub mod resolver;

pub use exchange::{ExchangeClient, ExchangeError};
pub use resolver::{JsonBodyCodec, ResponseResolver};
