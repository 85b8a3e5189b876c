//! HTTP request/response model.
//!
//! # Data Flow
//! ```text
//! ApiRequest (method, URL, params, headers, body, stream flag)
//!     → client builds the transport call
//!     → compression.rs (gzip body + header rewrite, if enabled)
//!     → response.rs wraps status/headers/body into ApiResponse
//!         - buffered: deserialized value
//!         - streaming: BodyStream holding the connection lease
//! ```

pub mod compression;
pub mod request;
pub mod response;

pub use compression::{gzip_compress, gzip_decompress, GzipRequestInterceptor, SKIP_COMPRESSION};
pub use request::ApiRequest;
pub use response::{ApiResponse, BodyStream, ResponseBody};
