//! Redirection of outgoing traffic to a mock endpoint
//!
//! When a builder is configured with a mockup URL, every request keeps its
//! path and query but is sent to the mock endpoint's scheme and host. The
//! original URL is still used as the cache key and travels to the mock in the
//! `X-Original-URL` header so the mock can tell requests apart.

use reqwest::header::HeaderName;
use tracing::trace;
use url::Url;

use crate::error::{RestError, Result};

/// Header carrying the pre-rewrite URL to the mock endpoint
pub const ORIGINAL_URL_HEADER: HeaderName = HeaderName::from_static("x-original-url");

pub(crate) fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|source| RestError::InvalidUrl {
        url: url.to_owned(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mockup {
    endpoint: Url,
}

impl Mockup {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = parse_url(endpoint)?;
        if endpoint.host_str().is_none() {
            return Err(RestError::MissingHost(endpoint.to_string()));
        }
        Ok(Self { endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Rewrite `url` onto the mock endpoint.
    ///
    /// Returns the URL to send to and the untouched URL to key the cache by.
    pub fn rewrite(&self, url: &str) -> Result<(Url, String)> {
        let mut target = parse_url(url)?;
        let invalid = || RestError::Mockup(format!("cannot redirect {url} to {}", self.endpoint));

        target
            .set_scheme(self.endpoint.scheme())
            .map_err(|()| invalid())?;
        target
            .set_host(self.endpoint.host_str())
            .map_err(|_| invalid())?;
        target
            .set_port(self.endpoint.port())
            .map_err(|()| invalid())?;

        trace!(original = url, rewritten = %target, "redirected to mockup");
        Ok((target, url.to_owned()))
    }
}
