//! The cache backend contract: a dyn-compatible trait with exactly the two
//! operations the cache layer needs, operating on plain JSON values rather
//! than an opaque serialization format.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use reqctx_core::{BackendError, Key};
use serde_json::Value;

/// A stored value plus the expiry/staleness metadata the cache layer needs
/// to decide whether a hit is fresh, stale-but-usable, or expired.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedEntry {
    pub value: Value,
    /// Past this point the entry is no longer returned as a hit.
    pub expires_at: Option<SystemTime>,
    /// Past this point (but before `expires_at`) the entry is stale: usable
    /// by `stale-while-revalidate` while a refresh runs in the background.
    pub stale_at: Option<SystemTime>,
}

impl CachedEntry {
    pub fn new(value: Value) -> Self {
        CachedEntry { value, expires_at: None, stale_at: None }
    }

    pub fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_stale_at(mut self, stale_at: SystemTime) -> Self {
        self.stale_at = Some(stale_at);
        self
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_stale(&self, now: SystemTime) -> bool {
        self.stale_at.is_some_and(|at| now >= at)
    }
}

/// A place the cache layer can read and write `CachedEntry`s.
///
/// Implementors only need to get this right for one key at a time; the
/// cache layer is responsible for all TTL/strategy/dedup decisions above
/// this trait. A failed `get` is treated as a miss by callers and a failed
/// `set` is logged and swallowed, so implementations should feel free to
/// let transient backend errors surface rather than hiding them.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read an entry. `Ok(None)` is a miss; `Ok(Some(_))` may still be
    /// expired or stale — the cache layer checks that, not the backend.
    async fn get(&self, key: &Key) -> Result<Option<CachedEntry>, BackendError>;

    /// Write (or overwrite) an entry.
    async fn set(&self, key: &Key, entry: CachedEntry) -> Result<(), BackendError>;
}

#[async_trait]
impl CacheBackend for Arc<dyn CacheBackend> {
    async fn get(&self, key: &Key) -> Result<Option<CachedEntry>, BackendError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &Key, entry: CachedEntry) -> Result<(), BackendError> {
        (**self).set(key, entry).await
    }
}

#[async_trait]
impl CacheBackend for Box<dyn CacheBackend> {
    async fn get(&self, key: &Key) -> Result<Option<CachedEntry>, BackendError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &Key, entry: CachedEntry) -> Result<(), BackendError> {
        (**self).set(key, entry).await
    }
}
