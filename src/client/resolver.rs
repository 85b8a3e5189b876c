//! Response resolution.
//!
//! # Responsibilities
//! - Normalize transport status and headers into the response envelope
//! - Deserialize buffered bodies into the requested type
//! - Share one codec configuration across all requests of a client
//!
//! # Design Decisions
//! - One `JsonBodyCodec` per client, so codec options behave identically
//!   for every request the client issues
//! - Non-success buffered responses are returned with an empty body rather
//!   than forcing the error payload through the caller's type

use bytes::Bytes;
use hyper::header::HeaderMap;
use hyper::StatusCode;
use serde::de::DeserializeOwned;

use crate::http::{ApiResponse, ResponseBody};

/// JSON body codec shared by all requests of one client.
#[derive(Debug, Clone)]
pub struct JsonBodyCodec {
    /// When the payload is a single JSON value but the target type is a
    /// sequence, wrap the value in a one-element array and retry.
    accept_single_value_as_array: bool,
}

impl Default for JsonBodyCodec {
    fn default() -> Self {
        Self {
            accept_single_value_as_array: true,
        }
    }
}

impl JsonBodyCodec {
    pub fn new(accept_single_value_as_array: bool) -> Self {
        Self {
            accept_single_value_as_array,
        }
    }

    /// Decode a JSON payload into the requested type.
    pub fn decode<U: DeserializeOwned>(&self, bytes: &[u8]) -> Result<U, serde_json::Error> {
        match serde_json::from_slice(bytes) {
            Ok(value) => Ok(value),
            Err(primary) => {
                if self.accept_single_value_as_array {
                    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
                        if !value.is_array() {
                            let wrapped = serde_json::Value::Array(vec![value]);
                            if let Ok(decoded) = serde_json::from_value(wrapped) {
                                return Ok(decoded);
                            }
                        }
                    }
                }
                Err(primary)
            }
        }
    }
}

/// Assembles the uniform response envelope for buffered exchanges.
#[derive(Debug, Clone, Default)]
pub struct ResponseResolver {
    codec: JsonBodyCodec,
}

impl ResponseResolver {
    pub fn new(codec: JsonBodyCodec) -> Self {
        Self { codec }
    }

    /// Resolve a raw transport response into an [`ApiResponse`].
    ///
    /// Empty bodies resolve to [`ResponseBody::Empty`]. Non-success
    /// statuses skip deserialization; callers inspect the status. A body
    /// that does not match the requested type is a deserialization fault.
    pub fn resolve<U: DeserializeOwned>(
        &self,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<ApiResponse<U>, serde_json::Error> {
        if body.is_empty() || !status.is_success() {
            return Ok(ApiResponse::new(status, headers, ResponseBody::Empty));
        }
        let value = self.codec.decode::<U>(&body)?;
        Ok(ApiResponse::new(status, headers, ResponseBody::Value(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
        name: String,
    }

    #[test]
    fn test_resolve_typed_body() {
        let resolver = ResponseResolver::default();
        let body = Bytes::from_static(br#"[{"id":1,"name":"boots"},{"id":2,"name":"laces"}]"#);
        let response: ApiResponse<Vec<Item>> = resolver
            .resolve(StatusCode::OK, HeaderMap::new(), body)
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().map(Vec::len), Some(2));
    }

    #[test]
    fn test_single_value_accepted_as_array() {
        let resolver = ResponseResolver::default();
        let body = Bytes::from_static(br#"{"id":1,"name":"boots"}"#);
        let response: ApiResponse<Vec<Item>> = resolver
            .resolve(StatusCode::OK, HeaderMap::new(), body)
            .unwrap();
        assert_eq!(
            response.into_body(),
            Some(vec![Item { id: 1, name: "boots".into() }])
        );
    }

    #[test]
    fn test_single_value_retry_can_be_disabled() {
        let resolver = ResponseResolver::new(JsonBodyCodec::new(false));
        let body = Bytes::from_static(br#"{"id":1,"name":"boots"}"#);
        let result: Result<ApiResponse<Vec<Item>>, _> =
            resolver.resolve(StatusCode::OK, HeaderMap::new(), body);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_body_resolves_to_empty() {
        let resolver = ResponseResolver::default();
        let response: ApiResponse<Vec<Item>> = resolver
            .resolve(StatusCode::NO_CONTENT, HeaderMap::new(), Bytes::new())
            .unwrap();
        assert!(response.body().is_none());
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_error_status_skips_deserialization() {
        let resolver = ResponseResolver::default();
        let body = Bytes::from_static(br#"{"error":"not found"}"#);
        let response: ApiResponse<Vec<Item>> = resolver
            .resolve(StatusCode::NOT_FOUND, HeaderMap::new(), body)
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().is_none());
    }

    #[test]
    fn test_mismatched_body_is_a_fault() {
        let resolver = ResponseResolver::default();
        let body = Bytes::from_static(br#"["plain", "strings"]"#);
        let result: Result<ApiResponse<Vec<Item>>, _> =
            resolver.resolve(StatusCode::OK, HeaderMap::new(), body);
        assert!(result.is_err());
    }
}
