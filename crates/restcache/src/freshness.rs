//! Freshness metadata derived from response headers
//!
//! Each network response is evaluated exactly once. The result decides
//! whether the response may be stored and, once stored, whether it can be
//! served without contacting the origin.
//!
//! Precedence for the expiry instant:
//!
//! 1. `Cache-Control: max-age=N` or `s-maxage=N` (first numeric match). A
//!    match always ends the search, even when `N` is zero or overflows.
//! 2. `Expires`, only when Cache-Control carried no numeric max-age at all,
//!    and only if the date lies in the future.
//!
//! Unparseable values never fail the request; they count as "no signal".

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;
use reqwest::header::{CACHE_CONTROL, ETAG, EXPIRES, HeaderMap, HeaderName, LAST_MODIFIED};
use std::sync::LazyLock;

/// IMF-fixdate layout, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// IMF-fixdate without the day-name prefix
const HTTP_DATE_BODY_FORMAT: &str = "%d %b %Y %H:%M:%S GMT";

#[allow(clippy::expect_used)]
// expect_used: the pattern is a compile-time constant.
static MAX_AGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:max-age|s-maxage)=(\d+)").expect("max-age pattern is valid")
});

/// Parse an HTTP date in IMF-fixdate form.
///
/// The day name must be present but is not checked against the date.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let (_, date) = value.trim().split_once(',')?;
    NaiveDateTime::parse_from_str(date.trim_start(), HTTP_DATE_BODY_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format an instant as an IMF-fixdate HTTP date
pub fn format_http_date(instant: DateTime<Utc>) -> String {
    instant.format(HTTP_DATE_FORMAT).to_string()
}

/// First value of a header as text, if present and visible ASCII
fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Derive the absolute expiry instant of a response received at `now`
pub fn derive_ttl(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cache_control = header_str(headers, &CACHE_CONTROL).unwrap_or_default();

    if let Some(captures) = MAX_AGE.captures(cache_control) {
        // A match settles it; Expires is not a fallback for max-age=0.
        let seconds = captures.get(1)?.as_str().parse::<i64>().ok()?;
        if seconds <= 0 {
            return None;
        }
        return TimeDelta::try_seconds(seconds).and_then(|age| now.checked_add_signed(age));
    }

    let expires = header_str(headers, &EXPIRES).and_then(parse_http_date)?;
    (expires > now).then_some(expires)
}

/// Derive the Last-Modified instant of a response
pub fn derive_last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    header_str(headers, &LAST_MODIFIED).and_then(parse_http_date)
}

/// Copy the entity tag of a response verbatim
pub fn derive_etag(headers: &HeaderMap) -> Option<String> {
    header_str(headers, &ETAG)
        .filter(|tag| !tag.is_empty())
        .map(ToOwned::to_owned)
}

/// Cache metadata computed for one network response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Freshness {
    /// Absolute instant after which the response is stale
    pub ttl: Option<DateTime<Utc>>,
    /// Parsed `Last-Modified` header
    pub last_modified: Option<DateTime<Utc>>,
    /// Verbatim `ETag` header
    pub etag: Option<String>,
    /// The response is only usable through a conditional re-check
    pub revalidate: bool,
}

impl Freshness {
    /// Evaluate the headers of a response received at `now`
    pub fn evaluate(headers: &HeaderMap, now: DateTime<Utc>) -> Self {
        let ttl = derive_ttl(headers, now);
        let last_modified = derive_last_modified(headers);
        let etag = derive_etag(headers);
        let revalidate = ttl.is_none() && (last_modified.is_some() || etag.is_some());

        Self {
            ttl,
            last_modified,
            etag,
            revalidate,
        }
    }

    /// Whether any freshness signal was derived at all
    pub fn is_cacheable(&self) -> bool {
        self.ttl.is_some() || self.last_modified.is_some() || self.etag.is_some()
    }
}
