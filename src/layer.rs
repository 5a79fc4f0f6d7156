use crate::capability::CompressionMarkers;
use crate::negotiate::{ForcedGzip, Negotiator};
use crate::service::CompressionService;
use compression_core::Level;
use tower::Layer;

/// Default minimum body size for negotiated compression.
pub const DEFAULT_MIN_SIZE: usize = 0;

/// Settings shared by every request on a route.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) level: Level,
    pub(crate) min_size: usize,
    pub(crate) skip_ranges: bool,
    pub(crate) negotiator: Negotiator,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: Level::Default,
            min_size: DEFAULT_MIN_SIZE,
            skip_ranges: false,
            negotiator: Negotiator::default(),
        }
    }
}

/// A Tower layer that compresses a route's responses according to the
/// compression markers the route's service carries.
///
/// Layer it directly over each route's handler, before any type erasure, so
/// the markers are still visible:
///
/// ```
/// use http_route_compression::{CompressionLayer, marker};
/// use std::convert::Infallible;
/// use tower::{Layer, service_fn};
///
/// let handler = service_fn(|_req: http::Request<()>| async {
///     Ok::<_, Infallible>(http::Response::new("This is a gzip compress text"))
/// });
///
/// let route = CompressionLayer::new().layer(marker::Gzip::new(handler));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompressionLayer {
    config: Config,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression level used by both codecs.
    pub fn level(mut self, level: Level) -> Self {
        self.config.level = level;
        self
    }

    /// Sets the minimum body size required for negotiated compression.
    ///
    /// Only routes with [`Capability::Auto`](crate::Capability::Auto) look at
    /// it: a response with a known Content-Length smaller than this value is
    /// sent uncompressed. Forced codecs ignore it.
    pub fn min_size(mut self, size: usize) -> Self {
        self.config.min_size = size;
        self
    }

    /// Sends range responses (those with a Content-Range header) uncompressed.
    ///
    /// Off by default. Like [`min_size`](Self::min_size), it only applies to
    /// [`Capability::Auto`](crate::Capability::Auto) routes.
    pub fn skip_range_responses(mut self, skip: bool) -> Self {
        self.config.skip_ranges = skip;
        self
    }

    /// Sets what forced-gzip routes do for clients that don't accept gzip.
    pub fn forced_gzip(mut self, policy: ForcedGzip) -> Self {
        self.config.negotiator = Negotiator::new(policy);
        self
    }
}

impl<S: CompressionMarkers> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::with_config(inner, self.config.clone())
    }
}
