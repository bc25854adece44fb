//! In-memory cache backend.

use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use reqctx_backend::{CacheBackend, CachedEntry};
use reqctx_core::key::Key;
use reqctx_core::BackendError;

/// In-memory cache backend keyed on [`Key`], bounded by entry count.
///
/// `MapBackend` stores every entry in the process in a sharded [`DashMap`],
/// with a FIFO insertion-order list evicting the oldest entry once
/// `max_entries` is exceeded.
///
/// # Caveats
///
/// - Data is **not persisted** — the backend is lost on process restart.
/// - Data is **not shared** across processes — reach for a networked backend
///   for that.
/// - Expiration is lazy: an expired entry is only dropped on the next `get`
///   or `set` that touches its key, not by a background sweep.
pub struct MapBackend {
    entries: DashMap<Key, CachedEntry>,
    order: Mutex<Vec<Key>>,
    max_entries: Option<usize>,
    label: String,
}

impl MapBackend {
    /// Start building a [`MapBackend`].
    pub fn builder() -> crate::builder::MapBackendBuilder {
        crate::builder::MapBackendBuilder::new()
    }

    pub(crate) fn new(max_entries: Option<usize>, label: String) -> Self {
        Self { entries: DashMap::new(), order: Mutex::new(Vec::new()), max_entries, label }
    }

    /// The number of entries currently stored, including ones that have
    /// expired but have not yet been evicted by a `get`/`set`.
    pub fn entry_count(&self) -> u64 {
        self.entries.len() as u64
    }

    fn record_metrics(&self) {
        crate::metrics::record_capacity(&self.label, self.entry_count());
    }

    fn evict_if_over_capacity(&self) {
        let Some(max_entries) = self.max_entries else { return };
        let mut order = self.order.lock().expect("MapBackend::order poisoned");
        while order.len() > max_entries {
            let oldest = order.remove(0);
            self.entries.remove(&oldest);
        }
    }
}

#[async_trait]
impl CacheBackend for MapBackend {
    async fn get(&self, key: &Key) -> Result<Option<CachedEntry>, BackendError> {
        let now = SystemTime::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove(key);
                self.order.lock().expect("MapBackend::order poisoned").retain(|k| k != key);
                self.record_metrics();
                return Ok(None);
            }
            return Ok(Some(entry.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &Key, entry: CachedEntry) -> Result<(), BackendError> {
        let is_new = self.entries.insert(key.clone(), entry).is_none();
        if is_new {
            self.order.lock().expect("MapBackend::order poisoned").push(key.clone());
        }
        self.evict_if_over_capacity();
        self.record_metrics();
        Ok(())
    }
}
