//! Generic API request.
//!
//! # Responsibilities
//! - Carry method, URL, query parameters, headers, body and stream flag
//! - Encode query parameters once, in one canonical order
//! - Stay transport-agnostic: serialization happens in the client

use std::collections::BTreeMap;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::Method;
use url::Url;

/// A generic API request.
///
/// `T` is the body payload type; requests without a body use the default
/// `()`. Query parameters are kept sorted so the encoded URL is canonical
/// regardless of insertion order.
#[derive(Debug, Clone)]
pub struct ApiRequest<T = ()> {
    method: Method,
    url: String,
    params: BTreeMap<String, String>,
    headers: HeaderMap,
    body: Option<T>,
    stream: bool,
}

impl ApiRequest<()> {
    /// Start a request with an explicit method.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: BTreeMap::new(),
            headers: HeaderMap::new(),
            body: None,
            stream: false,
        }
    }

    /// GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// PUT request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Attach a body payload. Fixes the payload type of the request.
    pub fn body<T>(self, body: T) -> ApiRequest<T> {
        ApiRequest {
            method: self.method,
            url: self.url,
            params: self.params,
            headers: self.headers,
            body: Some(body),
            stream: self.stream,
        }
    }
}

impl<T> ApiRequest<T> {
    /// Add one query parameter. Later values replace earlier ones for the
    /// same key.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add many query parameters.
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.params.insert(key.into(), value.into());
        }
        self
    }

    /// Append a header value. Existing values for the same name are kept.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Merge a prebuilt header map, appending all values.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.append(name.clone(), value.clone());
        }
        self
    }

    /// Request a streaming response: the body is returned as an opaque
    /// byte stream regardless of the response type parameter.
    pub fn stream(mut self) -> Self {
        self.stream = true;
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL as given, before query encoding.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Header map.
    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body payload, if any.
    pub fn payload(&self) -> Option<&T> {
        self.body.as_ref()
    }

    /// Whether a streaming response was requested.
    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// Encode the final URL: parse the target and append the sorted query
    /// parameters, each encoded exactly once.
    pub fn build_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.url)?;
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    pub(crate) fn into_parts(self) -> (Method, HeaderMap, Option<T>) {
        (self.method, self.headers, self.body)
    }
}
