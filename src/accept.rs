use http::header::{self, HeaderMap};

/// Smallest quality value that still marks a coding as acceptable.
///
/// HTTP qvalues carry at most three decimals, so anything below this is `q=0`.
pub const MIN_QUALITY: f32 = 0.001;

/// The content codings a client accepts, parsed from `Accept-Encoding`.
///
/// Codings are kept highest preference first. Parsing is best-effort: a
/// malformed segment is skipped and never invalidates the rest of the header.
/// An empty set means only the identity encoding is acceptable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptEncoding {
    accepted: Vec<(String, f32)>,
    rejected: Vec<String>,
}

impl AcceptEncoding {
    /// Parses a single header value such as `"gzip, deflate;q=0.5, br;q=0"`.
    pub fn parse(header: &str) -> Self {
        let mut this = Self::default();
        this.extend_from(header);
        this.sort();
        this
    }

    /// Parses every `Accept-Encoding` field in `headers` as one list.
    ///
    /// List members containing bytes outside visible ASCII are skipped; the
    /// rest of the field still counts.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut this = Self::default();
        for value in headers.get_all(header::ACCEPT_ENCODING) {
            for segment in value.as_bytes().split(|&b| b == b',') {
                if let Ok(segment) = std::str::from_utf8(segment) {
                    this.push_segment(segment);
                }
            }
        }
        this.sort();
        this
    }

    /// Returns true when no compressed coding is acceptable.
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// Iterates over the accepted codings, highest preference first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.accepted.iter().map(|(coding, _)| coding.as_str())
    }

    /// Returns true when `coding` is listed explicitly with a non-zero quality.
    pub fn contains(&self, coding: &str) -> bool {
        self.accepted
            .iter()
            .any(|(c, _)| c.eq_ignore_ascii_case(coding))
    }

    /// Returns true when the client accepts `coding`.
    ///
    /// A `*` entry accepts every coding that was not rejected with `q=0`.
    pub fn accepts(&self, coding: &str) -> bool {
        if self.contains(coding) {
            return true;
        }
        self.contains("*") && !self.rejected.iter().any(|c| c.eq_ignore_ascii_case(coding))
    }

    fn extend_from(&mut self, header: &str) {
        for segment in header.split(',') {
            self.push_segment(segment);
        }
    }

    fn push_segment(&mut self, segment: &str) {
        let Some((coding, quality)) = parse_segment(segment) else {
            return;
        };

        if self.is_listed(&coding) {
            return;
        }

        if quality < MIN_QUALITY {
            self.rejected.push(coding);
        } else {
            self.accepted.push((coding, quality));
        }
    }

    fn is_listed(&self, coding: &str) -> bool {
        self.accepted.iter().any(|(c, _)| c == coding) || self.rejected.iter().any(|c| c == coding)
    }

    fn sort(&mut self) {
        // Stable, so equal qualities keep header order.
        self.accepted.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    }
}

/// Parses one list member like `"gzip"` or `"br;q=0.8"`.
///
/// Returns `None` for empty or malformed members.
fn parse_segment(segment: &str) -> Option<(String, f32)> {
    let mut parts = segment.split(';');
    let coding = parts.next()?.trim();
    if coding.is_empty() || !coding.bytes().all(is_token_byte) {
        return None;
    }

    let mut quality = 1.0;
    for param in parts {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("q") {
            quality = parse_quality(value.trim())?;
        }
    }

    let coding = coding.to_ascii_lowercase();
    let coding = if coding == "x-gzip" {
        "gzip".to_owned()
    } else {
        coding
    };

    Some((coding, quality))
}

fn parse_quality(value: &str) -> Option<f32> {
    let q = value.parse::<f32>().ok()?;
    (q.is_finite() && (0.0..=1.0).contains(&q)).then_some(q)
}

/// `tchar` from RFC 9110 section 5.6.2.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
