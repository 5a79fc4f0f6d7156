//! Errors raised while streaming a compressed body.

use crate::codec::Codec;
use std::io;

/// A type-erased error, as produced by arbitrary inner bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type of [`CompressionBody`](crate::CompressionBody).
///
/// Any of these aborts the response: once bytes have left the process the
/// stream cannot be repaired, so the body ends instead of emitting a
/// truncated encoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The wrapped body failed.
    #[error("response body error: {0}")]
    Body(#[source] BoxError),

    /// The encoder rejected or could not flush a chunk.
    #[error("{codec} encoder failed: {source}")]
    Encode {
        /// Codec in use.
        codec: Codec,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// The encoder could not be finished.
    #[error("{codec} encoder failed to finish: {source}")]
    Finish {
        /// Codec in use.
        codec: Codec,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}
