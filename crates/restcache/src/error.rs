//! Error types for request dispatch

use thiserror::Error;

/// Errors surfaced by a single dispatched request.
///
/// Every variant is scoped to the request that produced it. Malformed
/// freshness headers are never reported here; they only disable caching for
/// the response that carried them.
#[derive(Debug, Error)]
pub enum RestError {
    /// The request body could not be encoded as JSON
    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request body could not be encoded as XML
    #[error("XML encode error: {0}")]
    Xml(#[from] quick_xml::SeError),

    /// The target URL did not parse
    #[error("Invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The target URL parsed but has no host to pool connections for
    #[error("URL has no host: {0}")]
    MissingHost(String),

    /// The configured proxy URL was rejected
    #[error("Invalid proxy {proxy:?}: {source}")]
    InvalidProxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request could not be redirected to the mock endpoint
    #[error("Mockup redirect failed: {0}")]
    Mockup(String),

    /// A custom header name or value was not valid HTTP
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Transport failure while connecting, sending or reading the body
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RestError {
    /// Check whether the request ran out of its configured timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// Check whether the failure happened while establishing a connection
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_connect())
    }

    /// Check whether the error was raised before any network activity
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, RestError>;
