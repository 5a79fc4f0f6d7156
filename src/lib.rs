//! Route-scoped HTTP response compression middleware for Tower.
//!
//! Each route declares how its responses should be compressed by wrapping its
//! service in a [`marker`] type. [`CompressionLayer`] reads that declaration
//! once, when it is layered over the route, and for every request combines it
//! with the client's `Accept-Encoding` header to pick an encoding.
//!
//! # Example
//!
//! ```
//! use http_route_compression::{CompressionLayer, marker};
//! use std::convert::Infallible;
//! use tower::{Layer, service_fn};
//!
//! async fn report(_req: http::Request<()>) -> Result<http::Response<String>, Infallible> {
//!     Ok(http::Response::new("This is a auto compress text".to_owned()))
//! }
//!
//! let route = CompressionLayer::new().layer(marker::Auto::new(service_fn(report)));
//! ```
//!
//! # Capabilities
//!
//! | Marker | Capability | Result |
//! |---|---|---|
//! | none | [`Capability::None`] | never compressed |
//! | [`marker::Auto`] | [`Capability::Auto`] | gzip if accepted, else deflate if accepted, else uncompressed |
//! | [`marker::Gzip`] | [`Capability::ForceGzip`] | always gzip (see [`ForcedGzip`]) |
//! | [`marker::Deflate`] | [`Capability::ForceDeflate`] | deflate if accepted, else uncompressed |
//!
//! When markers are stacked, gzip wins over deflate, which wins over auto.
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to the codec used
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding`
//!
//! The response is left untouched when it already has a `Content-Encoding`,
//! or when its status never carries a body. Negotiated (`Auto`) compression
//! also skips bodies below the configured minimum size, and range responses
//! when [`CompressionLayer::skip_range_responses`] is enabled.
//!
//! The encoder is always finished when the inner body ends, even if it wrote
//! nothing, so every compressed body is a complete stream. If the inner body
//! or the encoder fails, the error is logged and the body ends with an
//! [`Error`], which aborts the connection.

#![deny(missing_docs)]

mod accept;
mod body;
mod capability;
mod codec;
mod error;
mod future;
mod layer;
mod negotiate;
mod service;

pub use accept::{AcceptEncoding, MIN_QUALITY};
pub use body::CompressionBody;
pub use capability::{Capability, CompressionMarkers, marker};
pub use codec::Codec;
pub use compression_core::Level;
pub use error::{BoxError, Error};
pub use future::ResponseFuture;
pub use layer::{CompressionLayer, DEFAULT_MIN_SIZE};
pub use negotiate::{Action, ForcedGzip, Negotiator, negotiate};
pub use service::CompressionService;
