//! Per-builder client cache over the shared transport cache
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │ ConnectionPool (builder) │   │ ConnectionPool (builder) │
//! │  origin → OriginClient   │   │  origin → OriginClient   │
//! └────────────┬─────────────┘   └────────────┬─────────────┘
//!              └──────────────┬───────────────┘
//!              ┌──────────────┴───────────────┐
//!              │ TransportCache (process)     │
//!              │  origin → Transport          │
//!              └──────────────────────────────┘
//! ```
//!
//! Both levels publish first-writer-wins, so concurrent first requests to an
//! origin converge on one transport and, per builder, one client.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use reqwest::Proxy;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{RestError, Result};
use crate::transport::{OriginClient, TransportCache};

/// Extract the pooling key `scheme://host[:port]` from a URL.
///
/// The port is only present when it differs from the scheme default.
pub fn origin_of(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| RestError::MissingHost(url.to_string()))?;

    Ok(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

/// Settings a pool applies to the clients and transports it creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_idle_per_host: usize,
    pub timeout: Option<Duration>,
    pub proxy: Option<String>,
}

impl PoolSettings {
    fn proxy(&self) -> Result<Option<Proxy>> {
        self.proxy
            .as_deref()
            .map(|proxy| {
                Proxy::all(proxy).map_err(|source| RestError::InvalidProxy {
                    proxy: proxy.to_owned(),
                    source,
                })
            })
            .transpose()
    }
}

/// Builder-scoped connection pool
#[derive(Debug)]
pub struct ConnectionPool {
    settings: PoolSettings,
    transports: Arc<TransportCache>,
    clients: OnceLock<DashMap<String, Arc<OriginClient>>>,
}

impl ConnectionPool {
    /// Create a pool over the process-wide transport cache
    pub fn new(settings: PoolSettings) -> Self {
        Self::with_transports(settings, TransportCache::global())
    }

    /// Create a pool over a specific transport cache
    pub fn with_transports(settings: PoolSettings, transports: Arc<TransportCache>) -> Self {
        Self {
            settings,
            transports,
            clients: OnceLock::new(),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn transports(&self) -> &Arc<TransportCache> {
        &self.transports
    }

    /// The client cache, allocated on first use
    fn clients(&self) -> &DashMap<String, Arc<OriginClient>> {
        self.clients.get_or_init(DashMap::new)
    }

    /// Whether the client cache has been allocated yet
    pub fn is_initialized(&self) -> bool {
        self.clients.get().is_some()
    }

    /// Number of origins this pool holds a client for
    pub fn client_count(&self) -> usize {
        self.clients.get().map_or(0, DashMap::len)
    }

    /// Get the pooled client for the origin of `url`
    pub fn connect(&self, url: &Url) -> Result<Arc<OriginClient>> {
        let origin = origin_of(url)?;
        let clients = self.clients();

        if let Some(client) = clients.get(&origin) {
            return Ok(Arc::clone(client.value()));
        }

        let proxy = self.settings.proxy()?;
        let transport =
            self.transports
                .get_or_create(&origin, self.settings.max_idle_per_host, proxy)?;
        let client = Arc::new(OriginClient::new(transport, self.settings.timeout));

        match clients.entry(origin) {
            Entry::Occupied(slot) => {
                debug!(origin = %slot.key(), "client published concurrently, discarding ours");
                Ok(Arc::clone(slot.get()))
            }
            Entry::Vacant(slot) => {
                debug!(origin = %slot.key(), timeout = ?self.settings.timeout, "created client");
                slot.insert(Arc::clone(&client));
                Ok(client)
            }
        }
    }
}
