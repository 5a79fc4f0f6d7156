use crate::codec::Codec;
use crate::error::{BoxError, Error};
use bytes::{Buf, Bytes, BytesMut};
use compression_codecs::EncodeV2;
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{Span, debug, error};

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

pin_project! {
    /// A response body that may be compressed.
    ///
    /// This type wraps an inner body and either compresses it using the
    /// specified codec or passes it through unchanged.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Compressed body with encoder.
        Compressed {
            #[pin]
            inner: B,
            state: CompressedBody,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

/// State and buffers for an actively compressed body.
pub(crate) struct CompressedBody {
    codec: Codec,
    encoder: Box<dyn EncodeV2 + Send>,
    output_buffer: Vec<u8>,
    always_flush: bool,
    state: CompressState,
    pending_trailers: Option<http::HeaderMap>,
    span: Span,
}

/// State machine for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressState {
    /// Reading data from inner body and compressing.
    Reading,
    /// Finishing compression after inner body is done.
    Finishing,
    /// Emitting buffered trailers.
    Trailers,
    /// Compression is complete, or was aborted.
    Done,
}

impl CompressedBody {
    fn new(codec: Codec, level: Level, always_flush: bool, span: Span) -> Self {
        Self {
            codec,
            encoder: codec.encoder(level),
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
            always_flush,
            state: CompressState::Reading,
            pending_trailers: None,
            span,
        }
    }

    /// Returns the current compression state.
    pub(crate) fn state(&self) -> CompressState {
        self.state
    }

    /// Returns whether always flush is enabled.
    #[allow(dead_code)]
    pub(crate) fn always_flush(&self) -> bool {
        self.always_flush
    }

    /// Polls the inner body and compresses data.
    fn poll_compressed<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, Error>>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        loop {
            match self.state {
                CompressState::Done => return Poll::Ready(None),

                CompressState::Trailers => {
                    self.state = CompressState::Done;
                    return match self.pending_trailers.take() {
                        Some(trailers) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        None => Poll::Ready(None),
                    };
                }

                CompressState::Finishing => {
                    let mut output =
                        WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());

                    let result = self.encoder.finish(&mut output);
                    let written = output.written_len();

                    let done = match result {
                        Ok(done) => done,
                        Err(source) => {
                            let err = Error::Finish {
                                codec: self.codec,
                                source,
                            };
                            return Poll::Ready(Some(Err(self.abort(err))));
                        }
                    };

                    if done {
                        self.state = if self.pending_trailers.is_some() {
                            CompressState::Trailers
                        } else {
                            CompressState::Done
                        };
                    }
                    if written > 0 {
                        let data = Bytes::copy_from_slice(&self.output_buffer[..written]);
                        return Poll::Ready(Some(Ok(Frame::data(data))));
                    }
                }

                CompressState::Reading => match inner.as_mut().poll_frame(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => {
                        self.state = CompressState::Finishing;
                    }
                    Poll::Ready(Some(Err(e))) => {
                        let err = Error::Body(e.into());
                        return Poll::Ready(Some(Err(self.abort(err))));
                    }
                    Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                        Ok(mut data) => {
                            let input = data.copy_to_bytes(data.remaining());
                            match self.compress_chunk(&input) {
                                // The encoder is holding everything back; read on.
                                Ok(output) if output.is_empty() => continue,
                                Ok(output) => return Poll::Ready(Some(Ok(Frame::data(output)))),
                                Err(err) => return Poll::Ready(Some(Err(self.abort(err)))),
                            }
                        }
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                // Buffer trailers and finish compression first
                                self.pending_trailers = Some(trailers);
                                self.state = CompressState::Finishing;
                            }
                        }
                    },
                },
            }
        }
    }

    /// Compresses a chunk of input data.
    fn compress_chunk(&mut self, input: &[u8]) -> Result<Bytes, Error> {
        // The flate backends reject empty input with a BufError.
        if input.is_empty() {
            return Ok(Bytes::new());
        }

        let codec = self.codec;
        let mut input_buf = PartialBuffer::new(input);
        let mut all_output = BytesMut::new();

        // Keep encoding until all input is consumed
        loop {
            let consumed = input_buf.written_len();
            let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());

            self.encoder
                .encode(&mut input_buf, &mut output)
                .map_err(|source| Error::Encode { codec, source })?;

            let written = output.written_len();
            all_output.extend_from_slice(&self.output_buffer[..written]);

            if input_buf.written_len() >= input.len() {
                break;
            }

            if written == 0 && input_buf.written_len() == consumed {
                return Err(Error::Encode {
                    codec,
                    source: io::Error::other("encoder made no progress"),
                });
            }
        }

        if self.always_flush {
            loop {
                let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());

                let done = self
                    .encoder
                    .flush(&mut output)
                    .map_err(|source| Error::Encode { codec, source })?;

                let written = output.written_len();
                all_output.extend_from_slice(&self.output_buffer[..written]);

                if done {
                    break;
                }
            }
        }

        Ok(all_output.freeze())
    }

    /// Ends the stream after a failure. Nothing more is emitted.
    fn abort(&mut self, err: Error) -> Error {
        self.state = CompressState::Done;
        self.span.in_scope(|| {
            error!(codec = %self.codec, error = %err, "aborting compressed response");
        });
        err
    }
}

impl Drop for CompressedBody {
    fn drop(&mut self) {
        if matches!(self.state, CompressState::Reading | CompressState::Finishing) {
            let _enter = self.span.enter();
            debug!(codec = %self.codec, "compressed body dropped before the encoder finished");
        }
    }
}

impl<B> CompressionBody<B> {
    /// Creates a compressed body with the given codec.
    ///
    /// Stream failures are reported in the span that is current when this
    /// is called.
    pub fn compressed(inner: B, codec: Codec, level: Level, always_flush: bool) -> Self {
        Self::compressed_in(inner, codec, level, always_flush, Span::current())
    }

    pub(crate) fn compressed_in(
        inner: B,
        codec: Codec,
        level: Level,
        always_flush: bool,
        span: Span,
    ) -> Self {
        Self::Compressed {
            inner,
            state: CompressedBody::new(codec, level, always_flush, span),
        }
    }

    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Returns the codec this body compresses with, if any.
    pub fn codec(&self) -> Option<Codec> {
        match self {
            CompressionBody::Compressed { state, .. } => Some(state.codec),
            CompressionBody::Passthrough { .. } => None,
        }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(Error::Body(e.into())))),
            },
            CompressionBodyProj::Compressed { inner, state } => state.poll_compressed(cx, inner),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { state, .. } => state.state() == CompressState::Done,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            // Compressed size is unknown
            CompressionBody::Compressed { .. } => http_body::SizeHint::default(),
        }
    }
}
