//! The cache layer: dispatches each `request()` through one of the four
//! strategies in [`CacheStrategy`] against a [`CacheBackend`], deduplicating
//! concurrent background revalidations per key.
//!
//! The strategy is a property of the *model*, not the layer: a model with
//! no [`ModelCacheConfig`] bypasses this layer entirely and its `request`
//! falls straight through to `self.inner`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use reqctx_backend::{CacheBackend, CachedEntry};
use reqctx_core::context::ContextOps;
use reqctx_core::key::Key;
use reqctx_core::model::{AttrValue, Model, ModelCacheConfig, ModelFuture, Tags};
use reqctx_core::props::Props;
use reqctx_core::registry::Registry;
use reqctx_core::{Ctx, ContextError};
use serde_json::Value;
use smol_str::SmolStr;

use crate::cache::config::{CacheConfig, CacheStrategy};

/// Wraps `inner`, routing `request()` through `backend` per each model's
/// own cache opt-in, falling back to `config`'s TTLs when a model doesn't
/// override them.
pub struct CacheCtx {
    inner: Ctx,
    backend: Arc<dyn CacheBackend>,
    config: Arc<CacheConfig>,
    disabled: Arc<AtomicBool>,
    inflight: Arc<DashMap<Key, ()>>,
}

impl CacheCtx {
    pub fn wrap(inner: Ctx, backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Ctx {
        Ctx::from_ops(CacheCtx {
            inner,
            backend,
            config: Arc::new(config),
            disabled: Arc::new(AtomicBool::new(false)),
            inflight: Arc::new(DashMap::new()),
        })
    }

    fn wrap_child(
        inner: Ctx,
        backend: Arc<dyn CacheBackend>,
        config: Arc<CacheConfig>,
        disabled: Arc<AtomicBool>,
        inflight: Arc<DashMap<Key, ()>>,
    ) -> Ctx {
        Ctx::from_ops(CacheCtx { inner, backend, config, disabled, inflight })
    }

    fn ttl_for(&self, cache: &ModelCacheConfig) -> Duration {
        cache.ttl.unwrap_or(self.config.ttl)
    }

    fn stale_ttl_for(&self, cache: &ModelCacheConfig) -> Option<Duration> {
        cache.stale_ttl.or(self.config.stale_ttl)
    }

    fn tags(&self, strategy: CacheStrategy) -> Tags {
        vec![
            (SmolStr::new("strategy"), AttrValue::from(strategy.as_str())),
            (SmolStr::new("provider"), AttrValue::from(self.config.provider.as_str())),
        ]
    }

    async fn fetch_and_store(
        &self,
        me: Ctx,
        model: &Model,
        props: Props,
        key: &Key,
        cache: &ModelCacheConfig,
    ) -> Result<Value, ContextError> {
        let result = self.inner.as_ops().request(me.clone(), model, props).await;
        if let Ok(value) = &result {
            let ttl = self.ttl_for(cache);
            self.store(key.clone(), value.clone(), ttl, self.stale_ttl_for(cache)).await;
            let mut tags = self.tags(cache.strategy);
            tags.push((SmolStr::new("ttl"), AttrValue::Int(ttl.as_secs() as i64)));
            tracing::trace!(target: "reqctx", key = %key, "cache.update");
            me.event("cache.update", tags);
        }
        result
    }

    async fn store(&self, key: Key, value: Value, ttl: Duration, stale_ttl: Option<Duration>) {
        if !self.should_cache() {
            return;
        }
        let now = SystemTime::now();
        let mut entry = CachedEntry::new(value).with_expiry(now + ttl);
        if let Some(stale_ttl) = stale_ttl {
            entry = entry.with_stale_at(now + stale_ttl);
        }
        if let Err(error) = self.backend.set(&key, entry).await {
            tracing::debug!(target: "reqctx", key = %key, %error, "cache.write_failed");
        }
    }

    /// Spawns a background refresh for `key`, unless one is already
    /// in-flight — the dogpile-prevention behavior `StaleWhileRevalidate`
    /// needs so N concurrent stale hits trigger exactly one refetch.
    fn spawn_revalidation(
        &self,
        me: Ctx,
        inner: Ctx,
        model: Model,
        props: Props,
        key: Key,
        cache: ModelCacheConfig,
    ) {
        if self.inflight.insert(key.clone(), ()).is_some() {
            return;
        }
        let backend = self.backend.clone();
        let ttl = self.ttl_for(&cache);
        let stale_ttl = self.stale_ttl_for(&cache);
        let disabled = self.disabled.clone();
        let inflight = self.inflight.clone();
        let refresh_key = key.clone();
        let tags = self.tags(cache.strategy);
        tokio::spawn(async move {
            let result = inner.request(&model, props).await;
            if !disabled.load(Ordering::Relaxed) {
                if let Ok(value) = result {
                    let now = SystemTime::now();
                    let mut entry = CachedEntry::new(value).with_expiry(now + ttl);
                    if let Some(stale_ttl) = stale_ttl {
                        entry = entry.with_stale_at(now + stale_ttl);
                    }
                    match backend.set(&refresh_key, entry).await {
                        Ok(()) => {
                            let mut tags = tags;
                            tags.push((SmolStr::new("ttl"), AttrValue::Int(ttl.as_secs() as i64)));
                            tracing::trace!(target: "reqctx", key = %refresh_key, "cache.update");
                            me.event("cache.update", tags);
                        }
                        Err(error) => {
                            tracing::debug!(target: "reqctx", key = %refresh_key, %error, "cache.revalidate_failed");
                        }
                    }
                }
            }
            inflight.remove(&refresh_key);
        });
    }
}

#[async_trait]
impl ContextOps for CacheCtx {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn parent(&self) -> Option<&Ctx> {
        self.inner.parent()
    }

    fn start_time(&self) -> Instant {
        self.inner.start_time()
    }

    fn end_time(&self) -> Option<Instant> {
        self.inner.end_time()
    }

    fn error(&self) -> Option<ContextError> {
        self.inner.error()
    }

    fn registry(&self) -> &Arc<Registry> {
        self.inner.registry()
    }

    fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    fn kill(&self) {
        self.inner.kill();
    }

    fn end(&self) {
        self.inner.end();
    }

    fn fail(&self, error: ContextError) {
        self.inner.fail(error);
    }

    fn event(&self, name: &str, tags: Tags) {
        self.inner.event(name, tags);
    }

    fn create(&self, _me: Ctx, name: &str) -> Ctx {
        let child_inner = self.inner.create(name);
        CacheCtx::wrap_child(
            child_inner,
            self.backend.clone(),
            self.config.clone(),
            self.disabled.clone(),
            self.inflight.clone(),
        )
    }

    async fn resolve(&self, fut: ModelFuture) -> Result<Value, ContextError> {
        self.inner.resolve(fut).await
    }

    async fn request(&self, me: Ctx, model: &Model, props: Props) -> Result<Value, ContextError> {
        let Some(cache) = model.cache_strategy() else {
            return self.inner.as_ops().request(me, model, props).await;
        };
        if !self.should_cache() {
            return self.inner.as_ops().request(me, model, props).await;
        }

        let cache = *cache;
        let key = Key::new(model.display_name(), &props);
        let now = SystemTime::now();
        let tags = self.tags(cache.strategy);

        match cache.strategy {
            CacheStrategy::NetworkOnly => self.inner.as_ops().request(me, model, props).await,

            CacheStrategy::CacheOnly => match self.backend.get(&key).await {
                Ok(Some(entry)) if !entry.is_expired(now) => {
                    tracing::trace!(target: "reqctx", key = %key, "cache.hit");
                    me.event("cache.hit", tags);
                    Ok(entry.value)
                }
                Ok(_) => {
                    tracing::trace!(target: "reqctx", key = %key, "cache.miss");
                    me.event("cache.miss", tags);
                    Ok(Value::Null)
                }
                Err(error) => {
                    tracing::debug!(target: "reqctx", key = %key, %error, "cache.read_failed");
                    tracing::trace!(target: "reqctx", key = %key, "cache.miss");
                    me.event("cache.miss", tags);
                    Ok(Value::Null)
                }
            },

            CacheStrategy::CacheFirst => match self.backend.get(&key).await {
                Ok(Some(entry)) if !entry.is_expired(now) => {
                    tracing::trace!(target: "reqctx", key = %key, "cache.hit");
                    me.event("cache.hit", tags);
                    Ok(entry.value)
                }
                _ => {
                    tracing::trace!(target: "reqctx", key = %key, "cache.miss");
                    me.event("cache.miss", tags);
                    self.fetch_and_store(me, model, props, &key, &cache).await
                }
            },

            CacheStrategy::StaleWhileRevalidate => match self.backend.get(&key).await {
                Ok(Some(entry)) if !entry.is_expired(now) => {
                    tracing::trace!(target: "reqctx", key = %key, "cache.hit");
                    me.event("cache.hit", tags);
                    if entry.is_stale(now) {
                        self.spawn_revalidation(me, self.inner.clone(), model.clone(), props, key, cache);
                    }
                    Ok(entry.value)
                }
                _ => {
                    tracing::trace!(target: "reqctx", key = %key, "cache.miss");
                    me.event("cache.miss", tags);
                    self.fetch_and_store(me, model, props, &key, &cache).await
                }
            },
        }
    }

    fn set(&self, _me: Ctx, model: &Model, value: Value, props: Option<Props>) -> Result<(), ContextError> {
        self.inner.set(model, value, props)
    }

    fn disable_cache(&self) {
        self.disabled.store(true, Ordering::Relaxed);
        self.inner.disable_cache();
    }

    fn should_cache(&self) -> bool {
        !self.disabled.load(Ordering::Relaxed) && self.inner.should_cache()
    }
}
