//! Static configuration for the cache layer.

use std::time::Duration;

use smol_str::SmolStr;

pub use reqctx_core::{CacheStrategy, ModelCacheConfig};

/// Layer-wide defaults the cache layer falls back to when a model opts
/// into caching but does not override a TTL itself.
///
/// The strategy itself lives on the model (see [`Model::with_cache_strategy`](
/// reqctx_core::Model::with_cache_strategy)) — a model with no cache opt-in
/// bypasses this layer entirely, regardless of what is configured here.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// When set, an entry older than this (but younger than `ttl`) is
    /// still served but triggers a background revalidation under
    /// [`CacheStrategy::StaleWhileRevalidate`]. Ignored by other
    /// strategies.
    pub stale_ttl: Option<Duration>,
    /// The backend's label, recorded as the `provider` attribute on
    /// `cache.*` telemetry events.
    pub provider: SmolStr,
}

impl CacheConfig {
    pub fn new(ttl: Duration) -> Self {
        CacheConfig { ttl, stale_ttl: None, provider: SmolStr::new("default") }
    }

    pub fn with_stale_ttl(mut self, stale_ttl: Duration) -> Self {
        self.stale_ttl = Some(stale_ttl);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<SmolStr>) -> Self {
        self.provider = provider.into();
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::new(Duration::from_secs(60))
    }
}
