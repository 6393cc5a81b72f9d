//! Request dispatch pipeline
//!
//! Every request walks the same linear path with two early exits:
//!
//! ```text
//! cache lookup ──fresh──────────────────────────────────────────► cached response
//!      │ miss / stale
//!      ▼
//! encode body ─► connect ─► headers ─► send & read ──304──────────► cached response
//!                                            │ other status
//!                                            ▼
//!                                 freshness ─► store (first writer wins)
//! ```
//!
//! Only read verbs (GET, HEAD, OPTIONS) consult or populate the cache.

use chrono::Utc;
use reqwest::header::{
    ACCEPT, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
    IF_MODIFIED_SINCE, IF_NONE_MATCH,
};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cache::{CacheLookup, ResourceCache};
use crate::config::ClientConfig;
use crate::error::{RestError, Result};
use crate::freshness::format_http_date;
use crate::mockup::{Mockup, ORIGINAL_URL_HEADER, parse_url};
use crate::pool::{ConnectionPool, PoolSettings};
use crate::response::Response;
use crate::transport::TransportCache;

/// Verbs whose responses may be served from and stored in the cache
pub fn is_read_verb(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Verbs that carry a request body and therefore a `Content-Type`
pub fn is_content_verb(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// The single conditional header used to revalidate `cached`.
///
/// The entity tag wins over the modification date when both are known.
pub fn conditional_header(cached: &Response) -> Option<(HeaderName, HeaderValue)> {
    match (cached.etag(), cached.last_modified()) {
        (Some(etag), _) => HeaderValue::from_str(etag)
            .ok()
            .map(|value| (IF_NONE_MATCH, value)),
        (None, Some(modified)) => HeaderValue::from_str(&format_http_date(modified))
            .ok()
            .map(|value| (IF_MODIFIED_SINCE, value)),
        (None, None) => None,
    }
}

/// Configured entry point for dispatching requests.
///
/// Clones share the connection pool and the resource cache.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    config: Arc<ClientConfig>,
    headers: Option<HeaderMap>,
    mockup: Option<Mockup>,
    pool: Arc<ConnectionPool>,
    cache: Arc<ResourceCache>,
}

impl RequestBuilder {
    /// Create a builder using the process-wide caches
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_caches(config, ResourceCache::global(), TransportCache::global())
    }

    /// Create a builder from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    /// Create a builder over explicit resource and transport caches
    pub fn with_caches(
        config: ClientConfig,
        cache: Arc<ResourceCache>,
        transports: Arc<TransportCache>,
    ) -> Result<Self> {
        let mockup = config.mockup_url.as_deref().map(Mockup::new).transpose()?;
        let settings = PoolSettings {
            max_idle_per_host: config.effective_max_idle(),
            timeout: config.effective_timeout(),
            proxy: config.proxy.clone(),
        };

        Ok(Self {
            config: Arc::new(config),
            headers: None,
            mockup,
            pool: Arc::new(ConnectionPool::with_transports(settings, transports)),
            cache,
        })
    }

    /// Replace the default request headers with `headers`
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Add one custom header; custom headers replace the defaults
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RestError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| RestError::InvalidHeader(format!("{name}: {e}")))?;
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .append(name, value);
        Ok(self)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Send `verb` to `url` (appended to the base URL) with an optional body
    pub async fn dispatch<B>(&self, verb: Method, url: &str, body: Option<&B>) -> Result<Arc<Response>>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{url}", self.config.base_url);
        let caching = !self.config.disable_cache && is_read_verb(&verb);

        let stale = match caching.then(|| self.cache.lookup(&url, Utc::now())).flatten() {
            Some(CacheLookup::Fresh(cached)) => {
                debug!(%verb, url = %url, "served from cache");
                return Ok(cached);
            }
            Some(CacheLookup::Stale(cached)) => Some(cached),
            None => None,
        };

        let payload = body
            .map(|body| self.config.content_type.encode(body))
            .transpose()?;

        let (send_url, cache_url) = match &self.mockup {
            Some(mockup) => mockup.rewrite(&url)?,
            None => (parse_url(&url)?, url),
        };

        let client = self.pool.connect(&send_url)?;
        let headers = self.request_headers(&verb, stale.as_deref(), &cache_url)?;

        let mut request = client.request(verb.clone(), send_url).headers(headers);
        if let Some(payload) = payload {
            request = request.body(payload);
        }

        let http_response = request.send().await?;
        let status = http_response.status();
        let response_headers = http_response.headers().clone();
        let body = http_response.bytes().await?;

        if status == StatusCode::NOT_MODIFIED {
            if let Some(cached) = &stale {
                debug!(%verb, url = %cache_url, "not modified, serving cached response");
                return Ok(Arc::clone(cached));
            }
        }

        let response = Arc::new(Response::new(status, response_headers, body, Utc::now()));

        if caching && response.freshness().is_cacheable() {
            let stored = match &stale {
                Some(observed) => {
                    self.cache
                        .replace_stale(&cache_url, observed, Arc::clone(&response))
                }
                None => self.cache.set_nx(&cache_url, Arc::clone(&response)),
            };
            debug!(
                %verb,
                url = %cache_url,
                stored,
                ttl = ?response.ttl(),
                revalidate = response.revalidate(),
                "cached response"
            );
        }

        Ok(response)
    }

    fn request_headers(
        &self,
        verb: &Method,
        stale: Option<&Response>,
        cache_url: &str,
    ) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        if self.mockup.is_some() {
            let original = HeaderValue::from_str(cache_url)
                .map_err(|e| RestError::InvalidHeader(format!("{ORIGINAL_URL_HEADER}: {e}")))?;
            headers.insert(ORIGINAL_URL_HEADER, original);
        }

        if let Some(custom) = &self.headers {
            headers = custom.clone();
        }

        let media_type = HeaderValue::from_static(self.config.content_type.mime());
        headers.insert(ACCEPT, media_type.clone());
        if is_content_verb(verb) {
            headers.insert(CONTENT_TYPE, media_type);
        }

        if let Some((name, value)) = stale.and_then(conditional_header) {
            trace!(header = %name, value = ?value, "revalidating cached response");
            headers.insert(name, value);
        }

        Ok(headers)
    }

    pub async fn get(&self, url: &str) -> Result<Arc<Response>> {
        self.dispatch::<()>(Method::GET, url, None).await
    }

    pub async fn head(&self, url: &str) -> Result<Arc<Response>> {
        self.dispatch::<()>(Method::HEAD, url, None).await
    }

    pub async fn options(&self, url: &str) -> Result<Arc<Response>> {
        self.dispatch::<()>(Method::OPTIONS, url, None).await
    }

    pub async fn delete(&self, url: &str) -> Result<Arc<Response>> {
        self.dispatch::<()>(Method::DELETE, url, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Arc<Response>> {
        self.dispatch(Method::POST, url, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Arc<Response>> {
        self.dispatch(Method::PUT, url, Some(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Arc<Response>> {
        self.dispatch(Method::PATCH, url, Some(body)).await
    }
}
