//! Route abstraction.
//!
//! # Responsibilities
//! - Represent a logical destination (scheme + host + port)
//! - Partition pooled connections per destination
//! - Derive the route key from a request URL

use url::Url;

/// A logical destination used to partition pooled connections.
///
/// Two requests share pooled connections if and only if their routes are
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    scheme: String,
    host: String,
    port: u16,
}

impl Route {
    /// Build a route from its parts.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Derive the route from a parsed URL. Fails when the URL has no host;
    /// a missing port falls back to the scheme default (80 for http, 443
    /// for https).
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(Self::new(url.scheme(), host, port))
    }

    /// Route scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Route host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Route port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Socket address string used for the TCP connect.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}
