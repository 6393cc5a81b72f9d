//! # restcache - Caching and Connection Reuse for REST Clients
//!
//! This crate is the core of a REST client: for every outgoing request it
//! decides whether a previously stored response can answer it, reuses pooled
//! connections per origin, and derives freshness metadata from each network
//! response to steer later cache decisions.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │ RequestBuilder::dispatch                  │
//! │  ┌───────────────┐  ┌──────────────────┐  │
//! │  │ ResourceCache │  │ ConnectionPool   │  │
//! │  │ (URL → resp)  │  │ (origin → client)│  │
//! │  └───────────────┘  └────────┬─────────┘  │
//! │  ┌───────────────┐  ┌────────┴─────────┐  │
//! │  │ Freshness     │  │ TransportCache   │  │
//! │  └───────────────┘  │ (process-wide)   │  │
//! │                     └──────────────────┘  │
//! └───────────────────────────────────────────┘
//! ```
//!
//! - [`ResourceCache`]: URL-keyed responses, first writer wins, no eviction
//! - [`Freshness`]: TTL from `Cache-Control`/`Expires`, plus `ETag` and
//!   `Last-Modified` for revalidation
//! - [`ConnectionPool`]: one client per origin per builder, layered over one
//!   [`Transport`] per origin per process
//! - [`RequestBuilder`]: the dispatch pipeline tying the three together
//!
//! ## Cache Semantics
//!
//! - Only GET, HEAD and OPTIONS are served from or stored in the cache.
//! - `Cache-Control: max-age=N` (or `s-maxage=N`) makes a response fresh for
//!   `N` seconds. Without it, a future `Expires` date is used.
//! - A response without a TTL but with an `ETag` or `Last-Modified` header is
//!   stored for revalidation: the next request sends `If-None-Match` (preferred)
//!   or `If-Modified-Since`, and a `304 Not Modified` answer returns the stored
//!   response unchanged.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use restcache::{ClientConfig, RequestBuilder};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RequestBuilder::new(ClientConfig {
//!         base_url: "https://api.example.com".to_string(),
//!         timeout: Some(Duration::from_secs(2)),
//!         ..Default::default()
//!     })?;
//!
//!     // First call goes to the network; a repeat within max-age does not.
//!     let items = client.get("/v1/items").await?;
//!     println!("{} -> {} bytes", items.status(), items.body().len());
//!
//!     let again = client.get("/v1/items").await?;
//!     println!("cache stats: {:?}", client.cache().stats());
//!     # let _ = again;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! [`ClientConfig::from_env`] reads:
//!
//! ```bash
//! export RESTCACHE_BASE_URL="https://api.example.com"
//! export RESTCACHE_CONTENT_TYPE="json"        # or xml
//! export RESTCACHE_TIMEOUT_MS="500"
//! export RESTCACHE_DISABLE_TIMEOUT="false"
//! export RESTCACHE_MAX_IDLE_PER_HOST="2"
//! export RESTCACHE_PROXY="http://proxy.internal:3128"
//! export RESTCACHE_DISABLE_CACHE="false"
//! export RESTCACHE_MOCKUP_URL="http://127.0.0.1:9090"   # tests only
//! ```

pub mod cache;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod freshness;
pub mod mockup;
pub mod pool;
pub mod response;
pub mod transport;

pub use cache::{CacheLookup, CacheStats, ResourceCache};
pub use config::{ClientConfig, DEFAULT_MAX_IDLE_CONNS_PER_HOST, DEFAULT_TIMEOUT};
pub use content::ContentType;
pub use dispatch::RequestBuilder;
pub use error::{RestError, Result};
pub use freshness::Freshness;
pub use mockup::Mockup;
pub use pool::ConnectionPool;
pub use response::Response;
pub use transport::{OriginClient, Transport, TransportCache};

// Re-export the HTTP vocabulary used in the public API
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};
