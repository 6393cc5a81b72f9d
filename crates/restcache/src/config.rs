//! Configuration for request builders

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::content::ContentType;

/// Request timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Idle connections kept per origin when none is configured
pub const DEFAULT_MAX_IDLE_CONNS_PER_HOST: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix prepended verbatim to every request URL
    pub base_url: String,

    /// Body encoding and `Accept` media type
    pub content_type: ContentType,

    /// Request timeout; `None` or zero selects [`DEFAULT_TIMEOUT`]
    pub timeout: Option<Duration>,

    /// Send requests without any timeout
    pub disable_timeout: bool,

    /// Idle connections kept per origin; zero selects the default
    pub max_idle_conns_per_host: usize,

    /// Proxy URL applied to transports this builder creates
    pub proxy: Option<String>,

    /// Bypass the resource cache entirely
    pub disable_cache: bool,

    /// Redirect all traffic to this mock endpoint (tests only)
    pub mockup_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            content_type: ContentType::Json,
            timeout: None,
            disable_timeout: false,
            max_idle_conns_per_host: 0,
            proxy: None,
            disable_cache: false,
            mockup_url: None,
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// Unset or malformed values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str| {
            lookup(key)
                .and_then(|s| s.trim().parse::<bool>().ok())
                .unwrap_or(false)
        };

        Self {
            base_url: lookup("RESTCACHE_BASE_URL").unwrap_or(defaults.base_url),
            content_type: lookup("RESTCACHE_CONTENT_TYPE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.content_type),
            timeout: lookup("RESTCACHE_TIMEOUT_MS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_millis),
            disable_timeout: flag("RESTCACHE_DISABLE_TIMEOUT"),
            max_idle_conns_per_host: lookup("RESTCACHE_MAX_IDLE_PER_HOST")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.max_idle_conns_per_host),
            proxy: lookup("RESTCACHE_PROXY").filter(|s| !s.is_empty()),
            disable_cache: flag("RESTCACHE_DISABLE_CACHE"),
            mockup_url: lookup("RESTCACHE_MOCKUP_URL").filter(|s| !s.is_empty()),
        }
    }

    /// Timeout applied to each request; `None` means unbounded
    pub fn effective_timeout(&self) -> Option<Duration> {
        if self.disable_timeout {
            return None;
        }
        match self.timeout {
            Some(timeout) if !timeout.is_zero() => Some(timeout),
            _ => Some(DEFAULT_TIMEOUT),
        }
    }

    /// Idle-connection limit for transports created by this builder
    pub fn effective_max_idle(&self) -> usize {
        if self.max_idle_conns_per_host > 0 {
            self.max_idle_conns_per_host
        } else {
            DEFAULT_MAX_IDLE_CONNS_PER_HOST
        }
    }
}
