//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (caps > 0, timeouts > 0)
//! - Check per-route overrides against the global cap
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::ClientConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyClientName,
    ZeroPoolCap(&'static str),
    PerRouteExceedsTotal { max_per_route: usize, max_total: usize },
    ZeroTimeout(&'static str),
    EmptyOverrideHost,
    ZeroOverrideMax(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyClientName => write!(f, "client name must not be empty"),
            ValidationError::ZeroPoolCap(field) => write!(f, "pool.{} must be greater than zero", field),
            ValidationError::PerRouteExceedsTotal { max_per_route, max_total } => {
                write!(f, "pool.max_per_route ({}) exceeds pool.max_total ({})", max_per_route, max_total)
            }
            ValidationError::ZeroTimeout(field) => write!(f, "{} must be greater than zero", field),
            ValidationError::EmptyOverrideHost => write!(f, "route override host must not be empty"),
            ValidationError::ZeroOverrideMax(route) => {
                write!(f, "route override for {} must have max greater than zero", route)
            }
        }
    }
}

/// Validate a client configuration, collecting every violation.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.name.trim().is_empty() {
        errors.push(ValidationError::EmptyClientName);
    }
    if config.request_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("request_timeout_ms"));
    }

    let pool = &config.pool;
    if pool.max_total == 0 {
        errors.push(ValidationError::ZeroPoolCap("max_total"));
    }
    if pool.max_per_route == 0 {
        errors.push(ValidationError::ZeroPoolCap("max_per_route"));
    }
    if pool.max_per_route > pool.max_total {
        errors.push(ValidationError::PerRouteExceedsTotal {
            max_per_route: pool.max_per_route,
            max_total: pool.max_total,
        });
    }
    if pool.acquire_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("pool.acquire_timeout_ms"));
    }
    if pool.connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("pool.connect_timeout_ms"));
    }
    if pool.idle_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("pool.idle_timeout_ms"));
    }

    for over in &pool.route_overrides {
        if over.host.trim().is_empty() {
            errors.push(ValidationError::EmptyOverrideHost);
        }
        if over.max == 0 {
            errors.push(ValidationError::ZeroOverrideMax(format!("{}:{}", over.host, over.port)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
