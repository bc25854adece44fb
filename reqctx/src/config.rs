//! A single builder aggregating every capability layer's settings, so an
//! external collaborator (an HTTP binding, say) can produce a fully layered
//! context in one call instead of composing layers by hand.

use std::sync::Arc;
use std::time::Duration;

use reqctx_backend::CacheBackend;
use reqctx_core::{Ctx, Registry};
use reqctx_telemetry::{TelemetryConfig, TelemetryCtx};
use smol_str::SmolStr;

use crate::cache::{CacheCtx, CacheConfig};
use crate::compose::{compose, Layer};
use crate::deadline::DeadlineCtx;
use crate::overrides::{OverrideMap, OverridesCtx};

/// Aggregates every capability layer's settings behind one builder.
///
/// `overrides` and `cache`'s layer-wide TTL defaults are always active
/// (the cache layer itself only reads/writes for models that opt in via
/// `Model::with_cache_strategy`, against whatever backend is supplied to
/// [`build`](Self::build)); `deadline` and `telemetry` are opt-in.
#[derive(Default)]
pub struct ContextConfig {
    deadline: Option<Duration>,
    cache: CacheConfig,
    telemetry: Option<TelemetryConfig>,
    overrides: OverrideMap,
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(timeout);
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_override(mut self, display_name: impl Into<SmolStr>, model: reqctx_core::Model) -> Self {
        self.overrides.insert(display_name.into(), model);
        self
    }

    /// Builds a fresh root context, rooted at `name` against `registry`,
    /// then stacks deadline → overrides → cache → telemetry on top of it,
    /// per the data-flow order a request actually traverses (telemetry is
    /// outermost, so its span wraps every layer underneath).
    pub fn build(self, name: impl Into<SmolStr>, registry: Arc<Registry>, backend: Arc<dyn CacheBackend>) -> Ctx {
        let base = Ctx::root_with_registry(name, registry);

        let mut layers: Vec<Layer> = Vec::new();
        if let Some(timeout) = self.deadline {
            if !timeout.is_zero() {
                layers.push(Box::new(move |ctx| DeadlineCtx::wrap(ctx, timeout)));
            }
        }
        let overrides = self.overrides;
        layers.push(Box::new(move |ctx| OverridesCtx::wrap(ctx, overrides)));
        let cache = self.cache;
        layers.push(Box::new(move |ctx| CacheCtx::wrap(ctx, backend, cache)));
        if self.telemetry.is_some() {
            layers.push(Box::new(TelemetryCtx::wrap));
        }

        compose(base, layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqctx_memory::MapBackend;
    use std::sync::Arc;

    #[test]
    fn build_produces_a_live_context_with_given_name() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MapBackend::builder().build());
        let ctx = ContextConfig::new()
            .with_deadline(Duration::from_secs(5))
            .with_telemetry(TelemetryConfig::new("test-service"))
            .build("root", Arc::new(Registry::new()), backend);

        assert_eq!(ctx.name(), "root");
        assert!(ctx.is_alive());
    }
}
