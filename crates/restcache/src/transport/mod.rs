//! Transport layer for pooled HTTP connections
//!
//! A [`Transport`] owns the socket pool for one origin and is shared
//! process-wide through [`TransportCache::global`]. An [`OriginClient`] layers
//! a request timeout over a transport; clients are what the dispatch pipeline
//! actually sends through, and several clients with different timeouts may sit
//! on the same transport.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use reqwest::{Client, ClientBuilder, Method, Proxy, RequestBuilder};
use std::sync::{Arc, LazyLock, Once};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::Result;

/// How long an idle pooled connection is kept before being closed
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

static CRYPTO_PROVIDER: Once = Once::new();

static GLOBAL_TRANSPORT_CACHE: LazyLock<Arc<TransportCache>> =
    LazyLock::new(|| Arc::new(TransportCache::new()));

/// Install the ring crypto provider for rustls, once per process
pub(crate) fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Another component may already have installed one; either is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Connection pool for a single origin
#[derive(Debug)]
pub struct Transport {
    client: Client,
    origin: String,
    max_idle_per_host: usize,
    proxied: bool,
}

impl Transport {
    /// Create a transport for `origin`, optionally routed through `proxy`
    pub fn new(origin: &str, max_idle_per_host: usize, proxy: Option<Proxy>) -> Result<Self> {
        ensure_crypto_provider();

        let mut builder = ClientBuilder::new()
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(max_idle_per_host)
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60));

        let proxied = proxy.is_some();
        builder = match proxy {
            Some(proxy) => builder.proxy(proxy),
            None => builder.no_proxy(),
        };

        let client = builder.build()?;
        debug!(origin, max_idle_per_host, proxied, "created transport");

        Ok(Self {
            client,
            origin: origin.to_owned(),
            max_idle_per_host,
            proxied,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn max_idle_per_host(&self) -> usize {
        self.max_idle_per_host
    }

    /// Whether the creator of this transport configured a proxy
    pub fn is_proxied(&self) -> bool {
        self.proxied
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Process-wide `scheme://host` → transport map with insert-if-absent population
#[derive(Debug, Default)]
pub struct TransportCache {
    transports: DashMap<String, Arc<Transport>>,
}

impl TransportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transport cache shared by all builders
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_TRANSPORT_CACHE)
    }

    pub fn get(&self, origin: &str) -> Option<Arc<Transport>> {
        self.transports.get(origin).map(|t| Arc::clone(t.value()))
    }

    /// Return the transport for `origin`, creating it if absent.
    ///
    /// A transport built by a caller that loses the publication race is
    /// dropped and the winner's transport is returned instead.
    pub fn get_or_create(
        &self,
        origin: &str,
        max_idle_per_host: usize,
        proxy: Option<Proxy>,
    ) -> Result<Arc<Transport>> {
        if let Some(transport) = self.get(origin) {
            return Ok(transport);
        }

        let built = Arc::new(Transport::new(origin, max_idle_per_host, proxy)?);
        match self.transports.entry(origin.to_owned()) {
            Entry::Occupied(slot) => {
                debug!(origin, "transport published concurrently, discarding ours");
                Ok(Arc::clone(slot.get()))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&built));
                Ok(built)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

/// A transport plus the per-builder request timeout
#[derive(Debug)]
pub struct OriginClient {
    transport: Arc<Transport>,
    timeout: Option<Duration>,
}

impl OriginClient {
    pub fn new(transport: Arc<Transport>, timeout: Option<Duration>) -> Self {
        Self { transport, timeout }
    }

    /// Start a request through the pooled transport with this client's timeout
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.transport.inner().request(method, url);
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn origin(&self) -> &str {
        self.transport.origin()
    }

    /// Request timeout; `None` means unbounded
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
