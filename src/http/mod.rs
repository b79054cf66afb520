//! HTTP/1.1 client
//!
//! Request framing, response reception with the three body-framing modes
//! (chunked, Content-Length, `</body` sentinel) and header queries. The
//! reader works entirely inside the receive [`Buf`](crate::buf::Buf): chunk
//! framing is collapsed out of the buffer as it is decoded, so a successful
//! receive leaves exactly `header || body` behind.

mod client;

pub use client::{status_code, Client};

/// Maximum URL length in bytes, NUL excluded.
pub const HTTP_URL_MAX: usize = 1024;

/// Maximum header name length.
pub const HTTP_HNAME_MAX: usize = 256;

/// Maximum header value length.
pub const HTTP_HVALUE_MAX: usize = 1024;

/// End-of-header sentinel.
pub const EOH_SENTINEL: &[u8] = b"\r\n\r\n";

/// Block size for header reads.
pub(crate) const SMALL_READ_BLOCK: usize = 256;

/// Longest hex chunk-size line the chunked reader will accept.
pub(crate) const MAX_CHUNK_STR: usize = 20;

pub const HTTP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) reaper/0.1";

pub const HTTP_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Request verbs the crawler issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Head,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verb::Get => write!(f, "GET"),
            Verb::Head => write!(f, "HEAD"),
        }
    }
}

/// What a request round-trip produced, as seen by the crawl engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The numeric status of the final response.
    Status(u16),
    /// The page is already archived on disk; no GET was issued.
    AlreadyExists,
    /// The target resolved to a foreign host and cross-domain is disallowed.
    Xdomain,
    /// The URL was abandoned without an error worth reporting.
    SkipLink,
    /// The peer stalled past the socket timeout.
    Timeout,
}

/// One parsed header line. Entries are arena-allocated during a response
/// parse and released as soon as the value has been copied out.
#[derive(Debug, Clone)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

impl HeaderEntry {
    pub(crate) fn vacant() -> Self {
        Self {
            name: String::new(),
            value: String::new(),
        }
    }
}
