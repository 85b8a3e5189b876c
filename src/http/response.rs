//! Generic API response.
//!
//! # Responsibilities
//! - Wrap status, headers and body into one envelope
//! - Carry either a materialized value or a lazily-read byte stream
//! - Keep the pooled connection leased for the lifetime of a body stream
//!
//! # Design Decisions
//! - The stream owns its [`ConnectionLease`]: dropping or draining the
//!   stream is what releases the connection, so abandoned responses cannot
//!   starve the pool once they are dropped
//! - A cleanly drained stream marks its connection reusable; a stream
//!   dropped mid-body destroys the connection instead of pooling it

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use hyper::body::{Body, Incoming};
use hyper::header::HeaderMap;
use hyper::StatusCode;

use crate::pool::ConnectionLease;

/// Response body: a materialized value, an opaque byte stream, or nothing.
pub enum ResponseBody<U> {
    /// Deserialized value of the requested type (buffered mode).
    Value(U),
    /// Lazily-read byte stream bound to a still-leased connection.
    Stream(BodyStream),
    /// No body (empty response, or a degraded streaming-open failure).
    Empty,
}

impl<U: std::fmt::Debug> std::fmt::Debug for ResponseBody<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
            ResponseBody::Empty => f.write_str("Empty"),
        }
    }
}

/// A generic API response. Constructed once per exchange; immutable apart
/// from the body stream, which is consumed exactly once.
pub struct ApiResponse<U> {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody<U>,
}

impl<U> ApiResponse<U> {
    /// Assemble a response envelope.
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody<U>) -> Self {
        Self { status, headers, body }
    }

    /// A bodiless response carrying only a status. Used when a
    /// streaming-open transport fault is degraded to a status response.
    pub fn status_only(status: StatusCode) -> Self {
        Self::new(status, HeaderMap::new(), ResponseBody::Empty)
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Borrow the materialized body value, if this is a buffered response.
    pub fn body(&self) -> Option<&U> {
        match &self.body {
            ResponseBody::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Take the materialized body value.
    pub fn into_body(self) -> Option<U> {
        match self.body {
            ResponseBody::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Take the byte stream, if this is a streaming response.
    pub fn into_stream(self) -> Option<BodyStream> {
        match self.body {
            ResponseBody::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Borrow the body in its raw form.
    pub fn response_body(&self) -> &ResponseBody<U> {
        &self.body
    }
}

impl<U: std::fmt::Debug> std::fmt::Debug for ApiResponse<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

/// A lazily-read response body bound to a leased connection.
///
/// The connection is released when the stream is dropped or fully drained.
pub struct BodyStream {
    body: Incoming,
    lease: ConnectionLease,
    done: bool,
}

impl BodyStream {
    pub(crate) fn new(body: Incoming, mut lease: ConnectionLease) -> Self {
        // Until the body is drained the connection cannot be reused.
        lease.discard();
        Self {
            body,
            lease,
            done: false,
        }
    }

    /// Read the remaining body into one buffer, then release the
    /// connection.
    pub async fn collect(mut self) -> Result<Bytes, hyper::Error> {
        use futures_util::StreamExt;

        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, hyper::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            match Pin::new(&mut this.body).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    if let Ok(data) = frame.into_data() {
                        return Poll::Ready(Some(Ok(data)));
                    }
                    // Trailers are not surfaced; keep polling.
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    // Drained cleanly: the connection can go back to the
                    // pool when the stream drops.
                    this.lease.mark_reusable();
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyStream")
            .field("route", self.lease.route())
            .field("done", &self.done)
            .finish()
    }
}
