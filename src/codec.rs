use compression_codecs::{EncodeV2, deflate::DeflateEncoder, gzip::GzipEncoder};
use compression_core::Level;
use std::fmt;

/// Supported compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Gzip compression.
    Gzip,
    /// Raw DEFLATE compression.
    Deflate,
}

impl Codec {
    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
        }
    }

    /// Creates a new encoder for this codec.
    pub fn encoder(&self, level: Level) -> Box<dyn EncodeV2 + Send> {
        match self {
            Codec::Gzip => Box::new(GzipEncoder::new(level.into())),
            Codec::Deflate => Box::new(DeflateEncoder::new(level.into())),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}
