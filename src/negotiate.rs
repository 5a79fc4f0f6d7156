use crate::accept::AcceptEncoding;
use crate::capability::Capability;
use crate::codec::Codec;

/// The encoding chosen for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send the body as written.
    NoEncoding,
    /// Compress the body with the given codec.
    Encode(Codec),
}

impl Action {
    /// Returns the codec to compress with, if any.
    pub fn codec(&self) -> Option<Codec> {
        match self {
            Action::NoEncoding => None,
            Action::Encode(codec) => Some(*codec),
        }
    }
}

/// What a [`Capability::ForceGzip`] route does when the client does not
/// advertise gzip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForcedGzip {
    /// Compress anyway.
    #[default]
    Always,
    /// Send the body uncompressed, like a forced-deflate route does.
    IfAccepted,
}

/// Resolves a route's capability against a client's preferences.
#[derive(Debug, Clone, Copy, Default)]
pub struct Negotiator {
    forced_gzip: ForcedGzip,
}

impl Negotiator {
    /// Creates a negotiator with the given forced-gzip policy.
    pub fn new(forced_gzip: ForcedGzip) -> Self {
        Self { forced_gzip }
    }

    /// Picks exactly one action for the response.
    ///
    /// `Auto` prefers gzip over deflate whenever the client accepts both,
    /// whatever their relative quality values.
    pub fn resolve(&self, capability: Capability, accept: &AcceptEncoding) -> Action {
        let gzip = accept.accepts(Codec::Gzip.content_encoding());
        let deflate = accept.accepts(Codec::Deflate.content_encoding());

        match capability {
            Capability::None => Action::NoEncoding,
            Capability::ForceGzip => match self.forced_gzip {
                ForcedGzip::Always => Action::Encode(Codec::Gzip),
                ForcedGzip::IfAccepted if gzip => Action::Encode(Codec::Gzip),
                ForcedGzip::IfAccepted => Action::NoEncoding,
            },
            Capability::ForceDeflate if deflate => Action::Encode(Codec::Deflate),
            Capability::ForceDeflate => Action::NoEncoding,
            Capability::Auto if gzip => Action::Encode(Codec::Gzip),
            Capability::Auto if deflate => Action::Encode(Codec::Deflate),
            Capability::Auto => Action::NoEncoding,
        }
    }
}

/// Resolves with the default policy, where forced gzip is unconditional.
pub fn negotiate(capability: Capability, accept: &AcceptEncoding) -> Action {
    Negotiator::default().resolve(capability, accept)
}
