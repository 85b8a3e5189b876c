//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → handed to ExchangeClient at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a client is built from one config
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ClientConfig, CompressionSettings, PoolSettings, RouteMaxSettings};
pub use validation::{validate_config, ValidationError};
