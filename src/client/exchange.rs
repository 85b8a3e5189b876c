//! The exchange client.
//!
//! # Responsibilities
//! - Resolve a generic API request into a transport call against the pool
//! - Inject default JSON headers without overwriting caller headers
//! - Produce buffered or streaming responses without leaking connections
//!
//! # Design Decisions
//! - Buffered transport faults propagate as errors; a transport fault
//!   while opening a stream degrades to a 500 response instead, keeping
//!   the no-exception contract of lazily-consumed downloads
//! - The connection is released before deserialization in buffered mode,
//!   and by stream drop in streaming mode

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};
use url::Url;

use crate::client::resolver::ResponseResolver;
use crate::config::schema::ClientConfig;
use crate::http::{ApiRequest, ApiResponse, BodyStream, GzipRequestInterceptor, ResponseBody};
use crate::observability::{PoolMetricsBinder, SharedMetricsSink};
use crate::pool::{ConnectionPool, PoolConfig, PoolError, Route};
use crate::registry::ComponentLookup;

const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Error types for exchange operations.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP error status {0}")]
    Http(StatusCode),

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("failed to deserialize response body: {0}")]
    Deserialization(#[source] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] hyper::http::Error),
}

impl ExchangeError {
    /// Whether the caller may reasonably retry the exchange as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Pool(PoolError::Exhausted(_)))
    }
}

/// Issues HTTP exchanges through a bounded connection pool.
///
/// One instance serves many concurrent exchanges; the pool is the only
/// shared mutable state.
pub struct ExchangeClient {
    name: String,
    request_timeout: Duration,
    default_json_headers: bool,
    pool: ConnectionPool,
    resolver: ResponseResolver,
    interceptor: Option<GzipRequestInterceptor>,
}

impl ExchangeClient {
    /// Create a client from configuration, without a component registry.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_registry(config, None)
    }

    /// Create a client, looking up an optional metrics sink in the given
    /// registry. A missing registry or sink is non-fatal; the pool gauges
    /// are simply not registered.
    pub fn with_registry(config: ClientConfig, registry: Option<&dyn ComponentLookup>) -> Self {
        let pool = ConnectionPool::new(PoolConfig::from_settings(&config.pool));
        let interceptor = config.compression.gzip.then(GzipRequestInterceptor::new);

        if let Some(registry) = registry {
            match registry.lookup::<SharedMetricsSink>() {
                Some(sink) => {
                    PoolMetricsBinder::new(pool.clone(), &config.name).bind(sink.0.as_ref());
                }
                None => {
                    debug!(client = %config.name, "No metrics sink registered; pool gauges not bound");
                }
            }
        }

        Self {
            request_timeout: config.request_timeout(),
            name: config.name,
            default_json_headers: config.default_headers_json,
            pool,
            resolver: ResponseResolver::default(),
            interceptor,
        }
    }

    /// Client name, as used in gauge names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client's connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Close the client: idle pooled connections are dropped and later
    /// exchanges fail. In-flight exchanges and open streams finish
    /// normally.
    pub fn close(&self) {
        self.pool.close();
    }

    /// Perform one exchange.
    ///
    /// With `stream=false` the response body is read fully and
    /// deserialized into `U`; the connection is released before this
    /// method returns. With `stream=true` the response body is a
    /// [`BodyStream`] holding the connection until dropped or drained,
    /// and `U` is unused.
    pub async fn exchange<T, U>(&self, request: ApiRequest<T>) -> Result<ApiResponse<U>, ExchangeError>
    where
        T: Serialize,
        U: DeserializeOwned,
    {
        let url = request.build_url()?;
        let route = Route::from_url(&url).ok_or(ExchangeError::InvalidUrl(url::ParseError::EmptyHost))?;
        let host = host_header(&url)?;
        let path_and_query = path_and_query(&url);
        let stream = request.is_stream();
        let (method, mut headers, payload) = request.into_parts();

        let mut body = match payload {
            Some(payload) => Bytes::from(serde_json::to_vec(&payload).map_err(|e| {
                error!(client = %self.name, route = %route, error = %e, "Failed to serialize request body");
                ExchangeError::Serialization(e)
            })?),
            None => Bytes::new(),
        };

        // Default JSON headers, only when the caller set none.
        if self.default_json_headers {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, APPLICATION_JSON);
            }
            if !headers.contains_key(ACCEPT) {
                headers.insert(ACCEPT, APPLICATION_JSON);
            }
        }

        if stream {
            // Downloads carry no body; the type descriptor is ignored.
            return self.open_stream(&route, method, &path_and_query, headers, host).await;
        }

        if let Some(interceptor) = &self.interceptor {
            body = interceptor.intercept(&mut headers, body).map_err(|e| {
                error!(client = %self.name, route = %route, error = %e, "Request compression failed");
                ExchangeError::Compression(e)
            })?;
        }

        self.buffered(&route, method, &path_and_query, headers, host, body).await
    }

    /// Buffered mode: send, collect the whole body, release, resolve.
    async fn buffered<U: DeserializeOwned>(
        &self,
        route: &Route,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        host: HeaderValue,
        body: Bytes,
    ) -> Result<ApiResponse<U>, ExchangeError> {
        let mut lease = self.pool.acquire(route).await?;
        let request = build_transport_request(method, path_and_query, &headers, host, body)?;

        let outcome = tokio::time::timeout(self.request_timeout, async {
            let response = lease.sender().send_request(request).await?;
            let (parts, incoming) = response.into_parts();
            let collected = incoming.collect().await?;
            Ok::<_, hyper::Error>((parts, collected.to_bytes()))
        })
        .await;

        let (parts, bytes) = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(client = %self.name, route = %route, error = %e, "Transport failure during buffered exchange");
                lease.discard();
                return Err(ExchangeError::Transport(e.to_string()));
            }
            Err(_) => {
                error!(client = %self.name, route = %route, timeout = ?self.request_timeout, "Buffered exchange timed out");
                lease.discard();
                return Err(ExchangeError::Transport(format!(
                    "request timed out after {:?}",
                    self.request_timeout
                )));
            }
        };

        // Release the connection before touching the body.
        drop(lease);

        self.resolver.resolve(parts.status, parts.headers, bytes).map_err(|e| {
            error!(client = %self.name, route = %route, error = %e, "Failed to deserialize response body");
            ExchangeError::Deserialization(e)
        })
    }

    /// Streaming mode: send, then hand the still-leased connection to the
    /// response stream. Error statuses release the connection and fail;
    /// transport faults degrade to a 500 status response.
    async fn open_stream<U>(
        &self,
        route: &Route,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        host: HeaderValue,
    ) -> Result<ApiResponse<U>, ExchangeError> {
        let mut lease = self.pool.acquire(route).await?;
        let request = build_transport_request(method, path_and_query, &headers, host, Bytes::new())?;

        let outcome = tokio::time::timeout(self.request_timeout, lease.sender().send_request(request)).await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(client = %self.name, route = %route, error = %e, "Failed to open download stream");
                lease.discard();
                return Ok(ApiResponse::status_only(StatusCode::INTERNAL_SERVER_ERROR));
            }
            Err(_) => {
                error!(client = %self.name, route = %route, timeout = ?self.request_timeout, "Opening download stream timed out");
                lease.discard();
                return Ok(ApiResponse::status_only(StatusCode::INTERNAL_SERVER_ERROR));
            }
        };

        let (parts, incoming) = response.into_parts();
        if parts.status.is_client_error() || parts.status.is_server_error() {
            warn!(client = %self.name, route = %route, status = %parts.status, "Download returned error status");
            // The response body was never read; the connection is dirty.
            lease.discard();
            drop(lease);
            return Err(ExchangeError::Http(parts.status));
        }

        debug!(client = %self.name, route = %route, status = %parts.status, "Download stream open");
        Ok(ApiResponse::new(
            parts.status,
            parts.headers,
            ResponseBody::Stream(BodyStream::new(incoming, lease)),
        ))
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("name", &self.name)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Origin-form request target: path plus encoded query.
fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Host header value; the port is included unless it is the scheme
/// default.
fn host_header(url: &Url) -> Result<HeaderValue, ExchangeError> {
    let host = url.host_str().unwrap_or_default();
    let value = match (url.port(), url.scheme()) {
        (Some(port), _) => format!("{}:{}", host, port),
        (None, _) => host.to_string(),
    };
    HeaderValue::from_str(&value)
        .map_err(|e| ExchangeError::InvalidRequest(hyper::http::Error::from(e)))
}

fn build_transport_request(
    method: Method,
    path_and_query: &str,
    headers: &HeaderMap,
    host: HeaderValue,
    body: Bytes,
) -> Result<Request<Full<Bytes>>, ExchangeError> {
    let mut request = Request::builder()
        .method(method)
        .uri(path_and_query)
        .body(Full::new(body))?;
    *request.headers_mut() = headers.clone();
    if !request.headers().contains_key(HOST) {
        request.headers_mut().insert(HOST, host);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_header_keeps_explicit_port() {
        let url = Url::parse("http://api.example.com:8080/items").unwrap();
        assert_eq!(host_header(&url).unwrap(), "api.example.com:8080");
    }

    #[test]
    fn test_host_header_omits_default_port() {
        let url = Url::parse("http://api.example.com/items").unwrap();
        assert_eq!(host_header(&url).unwrap(), "api.example.com");
    }

    #[test]
    fn test_path_and_query() {
        let url = Url::parse("http://api.example.com/items?q=shoes").unwrap();
        assert_eq!(path_and_query(&url), "/items?q=shoes");
        let url = Url::parse("http://api.example.com/items").unwrap();
        assert_eq!(path_and_query(&url), "/items");
    }

    #[test]
    fn test_pool_exhaustion_is_retryable() {
        let err = ExchangeError::Pool(PoolError::Exhausted("http://h:1".into()));
        assert!(err.is_retryable());
        assert!(!ExchangeError::Http(StatusCode::BAD_GATEWAY).is_retryable());
    }
}
