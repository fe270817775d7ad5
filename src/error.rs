//! Error types for the crawler.
//!
//! Per-URL and per-attempt failures (`ExtractError`, `FetchError`, `ProxyError`)
//! are recoverable and handled inside the dispatcher. `CrawlError` is what the
//! entry points return to the caller.

use thiserror::Error;

/// The fetched content could not be turned into a traversable document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("malformed document for {url}: {reason}")]
    MalformedDocument { url: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("proxy pool exhausted: no alive proxies remain")]
    Exhausted,

    #[error("invalid proxy entry '{entry}': {reason}")]
    InvalidEntry { entry: String, reason: String },
}

/// A single fetch attempt failed. Every variant retires the proxy used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("fetch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u128 },

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("bot check page served for {url}")]
    Blocked { url: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("proxy configuration rejected: {0}")]
    Proxy(String),

    #[error("exceeded {max_redirects} redirects starting from {url}")]
    TooManyRedirects { url: String, max_redirects: usize },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("could not write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("object store upload failed: {0}")]
    Upload(String),

    #[error("object store target requires '{0}' in settings")]
    MissingSetting(&'static str),
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl FetchError {
    /// Short label used in logs and failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Status { .. } => "status",
            Self::Blocked { .. } => "blocked",
            Self::Transport(_) => "transport",
            Self::Proxy(_) => "proxy",
            Self::TooManyRedirects { .. } => "redirects",
        }
    }
}
