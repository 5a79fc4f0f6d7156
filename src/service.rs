use crate::accept::AcceptEncoding;
use crate::capability::{Capability, CompressionMarkers};
use crate::future::ResponseFuture;
use crate::layer::Config;
use http::Request;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{Span, debug};

/// A Tower service that compresses one route's responses.
///
/// The route's [`Capability`] is classified once, when the service is
/// built, and never changes afterwards.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    capability: Capability,
    config: Config,
}

impl<S: CompressionMarkers> CompressionService<S> {
    /// Creates a new compression service with default settings.
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, Config::default())
    }

    pub(crate) fn with_config(inner: S, config: Config) -> Self {
        let capability = Capability::of(&inner);
        Self {
            inner,
            capability,
            config,
        }
    }
}

impl<S> CompressionService<S> {
    /// Returns the capability the inner service declared.
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
{
    type Response = http::Response<crate::body::CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let accept = AcceptEncoding::from_headers(req.headers());
        let action = self.config.negotiator.resolve(self.capability, &accept);
        debug!(capability = ?self.capability, ?action, "negotiated content encoding");

        let inner = self.inner.call(req);

        ResponseFuture::new(
            inner,
            self.capability,
            action,
            self.config.clone(),
            Span::current(),
        )
    }
}
