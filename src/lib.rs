//! Reaper: a recursive web archiver
//!
//! Given a seed URL, a crawl depth and a per-request delay, reaper fetches
//! HTML pages over HTTP/1.1 (plain or TLS), extracts same-origin links,
//! rewrites absolute links to local filesystem paths and mirrors each page
//! under a directory tree rooted at the originating host.

pub mod buf;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod display;
pub mod frontier;
pub mod http;
pub mod net;
pub mod url;

use thiserror::Error;

/// Main error type for reaper operations
#[derive(Debug, Error)]
pub enum ReaperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("TLS handshake with {host} failed: {message}")]
    TlsHandshake { host: String, message: String },

    #[error("Failed to resolve host {0}")]
    Dns(String),

    #[error("No usable IPv4 address for host {0}")]
    NoAddress(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown HTTP status code {0}")]
    UnknownStatus(u16),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Crawl interrupted")]
    Interrupted,
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("URL exceeds maximum length: {0} bytes")]
    TooLong(usize),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for reaper operations
pub type Result<T> = std::result::Result<T, ReaperError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Engine;
pub use frontier::{CacheState, Frontier, FrontierPair};
pub use http::Client;
