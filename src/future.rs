use crate::body::CompressionBody;
use crate::capability::Capability;
use crate::layer::Config;
use crate::negotiate::Action;
use http::{Response, StatusCode, header};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{Span, debug};

pin_project! {
    /// Future for compression service responses.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        capability: Capability,
        action: Action,
        config: Config,
        span: Span,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(
        inner: F,
        capability: Capability,
        action: Action,
        config: Config,
        span: Span,
    ) -> Self {
        Self {
            inner,
            capability,
            action,
            config,
            span,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(response)) => {
                let response = wrap_response(
                    response,
                    *this.capability,
                    *this.action,
                    this.config,
                    this.span.clone(),
                );
                Poll::Ready(Ok(response))
            }
        }
    }
}

/// Wraps the response body with compression if the action calls for it.
///
/// Runs before the first body byte is polled, so the headers are final by
/// the time anything is written.
fn wrap_response<B>(
    response: Response<B>,
    capability: Capability,
    action: Action,
    config: &Config,
    span: Span,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    let Some(codec) = action.codec() else {
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    };

    // Content-Encoding is written at most once per response.
    if has_content_encoding(&parts.headers) {
        debug!(parent: &span, %codec, "response is already encoded, not compressing");
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    }

    // Negotiated compression can also back off for small and partial bodies.
    let skip = !body_allowed(parts.status)
        || (capability == Capability::Auto
            && ((config.skip_ranges && has_content_range(&parts.headers))
                || is_below_min_size(&parts.headers, config.min_size)));

    if skip {
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    }

    // Check for x-accel-buffering: no header or streaming content types
    let always_flush = parts
        .headers
        .get("x-accel-buffering")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("no"))
        || is_streaming_content_type(&parts.headers);

    parts.headers.insert(
        header::CONTENT_ENCODING,
        header::HeaderValue::from_static(codec.content_encoding()),
    );

    // Remove Content-Length since compressed size is unknown
    parts.headers.remove(header::CONTENT_LENGTH);

    // Remove Accept-Ranges since we can't support ranges on compressed content
    parts.headers.remove(header::ACCEPT_RANGES);

    add_vary_accept_encoding(&mut parts.headers);

    let body =
        CompressionBody::compressed_in(body, codec, config.level, always_flush, span);
    Response::from_parts(parts, body)
}

/// Returns false for statuses that never carry a body.
fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// Checks if Content-Encoding header is already present.
fn has_content_encoding(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_ENCODING)
}

/// Checks if Content-Range header is present (range response).
fn has_content_range(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_RANGE)
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut header::HeaderMap) {
    let covered = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|vary| vary.to_str().ok())
        .flat_map(|vary| vary.split(','))
        .map(str::trim)
        .any(|v| v == "*" || v.eq_ignore_ascii_case("accept-encoding"));

    if !covered {
        headers.append(
            header::VARY,
            header::HeaderValue::from_static("accept-encoding"),
        );
    }
}

/// Checks if the content type requires always flushing (e.g., streaming).
fn is_streaming_content_type(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.starts_with("text/event-stream") || ct.starts_with("application/grpc-web")
        })
}

/// Checks if Content-Length is below the minimum size.
fn is_below_min_size(headers: &header::HeaderMap, min_size: usize) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|len| len < min_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::CompressState;
    use crate::codec::Codec;

    const GZIP: Action = Action::Encode(Codec::Gzip);
    const DEFLATE: Action = Action::Encode(Codec::Deflate);

    fn make_response(body: &'static str) -> Response<&'static str> {
        Response::new(body)
    }

    fn make_response_with_headers<I>(body: &'static str, headers: I) -> Response<&'static str>
    where
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        let mut response = Response::new(body);
        for (name, value) in headers {
            response
                .headers_mut()
                .insert(name, header::HeaderValue::from_static(value));
        }
        response
    }

    fn wrap(
        response: Response<&'static str>,
        capability: Capability,
        action: Action,
    ) -> Response<CompressionBody<&'static str>> {
        wrap_response(response, capability, action, &Config::default(), Span::none())
    }

    fn wrap_with_min_size(
        response: Response<&'static str>,
        capability: Capability,
        min_size: usize,
    ) -> Response<CompressionBody<&'static str>> {
        let config = Config {
            min_size,
            ..Config::default()
        };
        wrap_response(response, capability, GZIP, &config, Span::none())
    }

    fn is_compressed<B>(response: &Response<CompressionBody<B>>) -> bool {
        matches!(response.body(), CompressionBody::Compressed { .. })
    }

    #[test]
    fn test_compress_sets_headers() {
        let response = make_response_with_headers("hello world", [("content-length", "11")]);
        let wrapped = wrap(response, Capability::ForceGzip, GZIP);

        match wrapped.body() {
            CompressionBody::Compressed { state, .. } => {
                assert_eq!(state.state(), CompressState::Reading);
            }
            _ => panic!("Expected compressed body"),
        }

        assert_eq!(
            wrapped.headers().get(header::CONTENT_ENCODING).unwrap(),
            "gzip"
        );
        assert!(wrapped.headers().get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_deflate_content_encoding() {
        let wrapped = wrap(make_response("hello world"), Capability::Auto, DEFLATE);
        assert_eq!(
            wrapped.headers().get(header::CONTENT_ENCODING).unwrap(),
            "deflate"
        );
        assert_eq!(wrapped.body().codec(), Some(Codec::Deflate));
    }

    #[test]
    fn test_no_encoding_is_untouched() {
        let response = make_response_with_headers(
            "hello world",
            [("content-length", "11"), ("accept-ranges", "bytes")],
        );
        let wrapped = wrap(response, Capability::None, Action::NoEncoding);

        assert!(!is_compressed(&wrapped));
        assert!(wrapped.headers().get(header::CONTENT_ENCODING).is_none());
        assert!(wrapped.headers().get(header::VARY).is_none());
        assert_eq!(wrapped.headers().get(header::CONTENT_LENGTH).unwrap(), "11");
        assert_eq!(
            wrapped.headers().get(header::ACCEPT_RANGES).unwrap(),
            "bytes"
        );
    }

    #[test]
    fn test_existing_content_encoding_not_duplicated() {
        let response = make_response_with_headers("hello world", [("content-encoding", "br")]);
        let wrapped = wrap(response, Capability::ForceGzip, GZIP);

        assert!(!is_compressed(&wrapped));
        let values: Vec<_> = wrapped
            .headers()
            .get_all(header::CONTENT_ENCODING)
            .iter()
            .collect();
        assert_eq!(values, vec!["br"]);
    }

    #[test]
    fn test_no_body_statuses_are_not_compressed() {
        for status in [StatusCode::NO_CONTENT, StatusCode::NOT_MODIFIED] {
            let mut response = make_response("");
            *response.status_mut() = status;
            let wrapped = wrap(response, Capability::ForceGzip, GZIP);

            assert!(!is_compressed(&wrapped));
            assert!(wrapped.headers().get(header::CONTENT_ENCODING).is_none());
        }
    }

    #[test]
    fn test_error_statuses_are_compressed() {
        let mut response = make_response("not found");
        *response.status_mut() = StatusCode::NOT_FOUND;
        let wrapped = wrap(response, Capability::ForceGzip, GZIP);
        assert!(is_compressed(&wrapped));
    }

    #[test]
    fn test_auto_skips_below_min_size() {
        let response = make_response_with_headers("small", [("content-length", "5")]);
        let wrapped = wrap_with_min_size(response, Capability::Auto, 100);
        assert!(!is_compressed(&wrapped));
        assert_eq!(wrapped.headers().get(header::CONTENT_LENGTH).unwrap(), "5");
    }

    #[test]
    fn test_auto_compresses_above_min_size() {
        let response =
            make_response_with_headers("large enough content", [("content-length", "200")]);
        let wrapped = wrap_with_min_size(response, Capability::Auto, 100);
        assert!(is_compressed(&wrapped));
        assert!(wrapped.headers().get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_auto_compresses_unknown_size() {
        let wrapped = wrap_with_min_size(make_response("unknown"), Capability::Auto, 100);
        assert!(is_compressed(&wrapped));
    }

    #[test]
    fn test_forced_ignores_min_size() {
        let response = make_response_with_headers("small", [("content-length", "5")]);
        let wrapped = wrap_with_min_size(response, Capability::ForceGzip, 100);
        assert!(is_compressed(&wrapped));
    }

    #[test]
    fn test_auto_compresses_range_response_by_default() {
        let response =
            make_response_with_headers("partial content", [("content-range", "bytes 0-99/200")]);
        let wrapped = wrap(response, Capability::Auto, GZIP);
        assert!(is_compressed(&wrapped));
        assert_eq!(wrapped.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
    }

    #[test]
    fn test_auto_skips_range_response_when_enabled() {
        let config = Config {
            skip_ranges: true,
            ..Config::default()
        };

        let response =
            make_response_with_headers("partial content", [("content-range", "bytes 0-99/200")]);
        let wrapped = wrap_response(response, Capability::Auto, GZIP, &config, Span::none());
        assert!(!is_compressed(&wrapped));
        assert!(wrapped.headers().get(header::CONTENT_ENCODING).is_none());

        let response = make_response("full content");
        let wrapped = wrap_response(response, Capability::Auto, GZIP, &config, Span::none());
        assert!(is_compressed(&wrapped));

        let response =
            make_response_with_headers("partial content", [("content-range", "bytes 0-99/200")]);
        let wrapped = wrap_response(response, Capability::ForceGzip, GZIP, &config, Span::none());
        assert!(is_compressed(&wrapped));
    }

    #[test]
    fn test_always_flush_when_x_accel_buffering_no() {
        let response = make_response_with_headers("streaming data", [("x-accel-buffering", "NO")]);
        let wrapped = wrap(response, Capability::Auto, GZIP);

        match wrapped.body() {
            CompressionBody::Compressed { state, .. } => assert!(state.always_flush()),
            _ => panic!("Expected compressed body"),
        }
    }

    #[test]
    fn test_always_flush_text_event_stream() {
        let response = make_response_with_headers(
            "event: data\n\n",
            [("content-type", "text/event-stream; charset=utf-8")],
        );
        let wrapped = wrap(response, Capability::Auto, GZIP);

        match wrapped.body() {
            CompressionBody::Compressed { state, .. } => assert!(state.always_flush()),
            _ => panic!("Expected compressed body"),
        }
    }

    #[test]
    fn test_no_always_flush_by_default() {
        let wrapped = wrap(make_response("normal data"), Capability::Auto, GZIP);

        match wrapped.body() {
            CompressionBody::Compressed { state, .. } => assert!(!state.always_flush()),
            _ => panic!("Expected compressed body"),
        }
    }

    #[test]
    fn test_vary_header_added() {
        let wrapped = wrap(make_response("hello world"), Capability::Auto, GZIP);
        assert_eq!(
            wrapped.headers().get(header::VARY).unwrap(),
            "accept-encoding"
        );
    }

    #[test]
    fn test_vary_header_appended() {
        let response = make_response_with_headers("hello world", [("vary", "origin")]);
        let wrapped = wrap(response, Capability::Auto, GZIP);

        let vary_values: Vec<_> = wrapped
            .headers()
            .get_all(header::VARY)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(vary_values, vec!["origin", "accept-encoding"]);
    }

    #[test]
    fn test_vary_header_not_duplicated() {
        for existing in ["Accept-Encoding", "origin, accept-encoding", "*"] {
            let response = make_response_with_headers("hello world", [("vary", existing)]);
            let wrapped = wrap(response, Capability::Auto, GZIP);
            assert_eq!(wrapped.headers().get_all(header::VARY).iter().count(), 1);
        }
    }

    #[test]
    fn test_accept_ranges_removed() {
        let response = make_response_with_headers("hello world", [("accept-ranges", "bytes")]);
        let wrapped = wrap(response, Capability::Auto, GZIP);
        assert!(wrapped.headers().get(header::ACCEPT_RANGES).is_none());
    }
}
