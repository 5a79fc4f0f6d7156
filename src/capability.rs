//! Per-route compression capability.
//!
//! A route declares how its responses should be compressed by wrapping its
//! service in one of the [`marker`] types, or by implementing
//! [`CompressionMarkers`] on its own handler type. The declaration is turned
//! into a [`Capability`] once, when the compression middleware is layered
//! over the route.

use tower::util::{BoxCloneService, BoxService, ServiceFn};

/// A route's declared compression policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Never compress.
    #[default]
    None,
    /// Compress with the best codec the client accepts.
    Auto,
    /// Always compress with gzip.
    ForceGzip,
    /// Compress with deflate if the client accepts it, otherwise send as is.
    ForceDeflate,
}

impl Capability {
    /// Classifies a handler by the markers it carries.
    ///
    /// Markers are checked in a fixed order: gzip, deflate, auto. The first
    /// one present wins, so a handler composed with conflicting markers
    /// always resolves to the same capability. No marker means
    /// [`Capability::None`].
    pub fn of<H: CompressionMarkers + ?Sized>(handler: &H) -> Self {
        if handler.forces_gzip() {
            Capability::ForceGzip
        } else if handler.forces_deflate() {
            Capability::ForceDeflate
        } else if handler.auto_compress() {
            Capability::Auto
        } else {
            Capability::None
        }
    }
}

/// Compression markers a handler carries.
///
/// Every method defaults to `false`, so an empty impl declares no
/// compression:
///
/// ```
/// use http_route_compression::{Capability, CompressionMarkers};
///
/// struct Health;
/// impl CompressionMarkers for Health {}
///
/// struct Report;
/// impl CompressionMarkers for Report {
///     fn auto_compress(&self) -> bool {
///         true
///     }
/// }
///
/// assert_eq!(Capability::of(&Health), Capability::None);
/// assert_eq!(Capability::of(&Report), Capability::Auto);
/// ```
pub trait CompressionMarkers {
    /// The handler asks for gzip regardless of the client.
    fn forces_gzip(&self) -> bool {
        false
    }

    /// The handler asks for deflate when the client supports it.
    fn forces_deflate(&self) -> bool {
        false
    }

    /// The handler asks for negotiated compression.
    fn auto_compress(&self) -> bool {
        false
    }
}

impl<S: CompressionMarkers + ?Sized> CompressionMarkers for Box<S> {
    fn forces_gzip(&self) -> bool {
        (**self).forces_gzip()
    }

    fn forces_deflate(&self) -> bool {
        (**self).forces_deflate()
    }

    fn auto_compress(&self) -> bool {
        (**self).auto_compress()
    }
}

impl<T> CompressionMarkers for ServiceFn<T> {}

// Boxed services have erased their markers; wrap them before boxing.
impl<T, U, E> CompressionMarkers for BoxService<T, U, E> {}

impl<T, U, E> CompressionMarkers for BoxCloneService<T, U, E> {}

/// Service wrappers that attach a compression marker to a route.
///
/// The wrappers are transparent services. They nest, and each one only adds
/// its own marker to whatever the wrapped service already declares:
///
/// ```
/// use http_route_compression::{Capability, marker};
/// use std::convert::Infallible;
/// use tower::service_fn;
///
/// let handler = service_fn(|_req: http::Request<()>| async {
///     Ok::<_, Infallible>(http::Response::new("hello"))
/// });
///
/// let route = marker::Deflate::new(marker::Gzip::new(handler));
/// assert_eq!(Capability::of(&route), Capability::ForceGzip);
/// ```
pub mod marker {
    use super::CompressionMarkers;
    use std::task::{Context, Poll};
    use tower::Service;

    macro_rules! marker {
        ($(#[$doc:meta])* $name:ident => $own:ident, $other1:ident, $other2:ident) => {
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $name<S> {
                inner: S,
            }

            impl<S> $name<S> {
                /// Marks `inner`.
                pub fn new(inner: S) -> Self {
                    Self { inner }
                }

                /// Returns a reference to the inner service.
                pub fn inner(&self) -> &S {
                    &self.inner
                }

                /// Consumes the marker, returning the inner service.
                pub fn into_inner(self) -> S {
                    self.inner
                }
            }

            impl<S: CompressionMarkers> CompressionMarkers for $name<S> {
                fn $own(&self) -> bool {
                    true
                }

                fn $other1(&self) -> bool {
                    self.inner.$other1()
                }

                fn $other2(&self) -> bool {
                    self.inner.$other2()
                }
            }

            impl<S, Req> Service<Req> for $name<S>
            where
                S: Service<Req>,
            {
                type Response = S::Response;
                type Error = S::Error;
                type Future = S::Future;

                fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                    self.inner.poll_ready(cx)
                }

                fn call(&mut self, req: Req) -> Self::Future {
                    self.inner.call(req)
                }
            }
        };
    }

    marker! {
        /// Compress according to the request's `Accept-Encoding`.
        Auto => auto_compress, forces_gzip, forces_deflate
    }

    marker! {
        /// Always compress with gzip.
        Gzip => forces_gzip, forces_deflate, auto_compress
    }

    marker! {
        /// Compress with deflate, if the client does not support it then
        /// don't compress.
        Deflate => forces_deflate, forces_gzip, auto_compress
    }
}
