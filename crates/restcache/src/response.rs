//! Cacheable result of one HTTP exchange

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::borrow::Cow;

use crate::freshness::Freshness;

/// Response returned by the dispatch pipeline.
///
/// Responses are handed out as `Arc<Response>` and never mutated after
/// construction, so a cached entry can be shared by any number of callers
/// without locking.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    freshness: Freshness,
}

impl Response {
    /// Build a response, evaluating its freshness metadata at `received_at`
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        received_at: DateTime<Utc>,
    ) -> Self {
        let freshness = Freshness::evaluate(&headers, received_at);
        Self {
            status,
            headers,
            body,
            freshness,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserialize a JSON body
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Absolute expiry instant, if one was derived
    pub fn ttl(&self) -> Option<DateTime<Utc>> {
        self.freshness.ttl
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.freshness.last_modified
    }

    pub fn etag(&self) -> Option<&str> {
        self.freshness.etag.as_deref()
    }

    /// The response may only be reused after a conditional re-check
    pub fn revalidate(&self) -> bool {
        self.freshness.revalidate
    }

    /// Whether the response may be served at `now` without contacting the origin
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        !self.freshness.revalidate && self.freshness.ttl.is_some_and(|ttl| ttl > now)
    }

    pub(crate) fn freshness(&self) -> &Freshness {
        &self.freshness
    }
}
