//! The overrides layer: substitutes a model for another by display name,
//! following a chain of substitutions to let test/staging setups swap in
//! fakes without touching call sites.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqctx_core::context::ContextOps;
use reqctx_core::model::{Model, ModelFuture, Tags};
use reqctx_core::props::Props;
use reqctx_core::registry::Registry;
use reqctx_core::{Ctx, ContextError};
use serde_json::Value;
use smol_str::SmolStr;

/// Following a chain of substitutions past this many hops means the chain
/// almost certainly cycles back on itself.
const MAX_OVERRIDE_DEPTH: usize = 16;

/// `display_name -> replacement model` substitutions, shared by every
/// context descended from the same [`OverridesCtx`].
pub type OverrideMap = HashMap<SmolStr, Model>;

/// Wraps `inner`, substituting models named in `overrides` before they
/// reach `request()`.
pub struct OverridesCtx {
    inner: Ctx,
    overrides: Arc<OverrideMap>,
}

impl OverridesCtx {
    pub fn wrap(inner: Ctx, overrides: OverrideMap) -> Ctx {
        Ctx::from_ops(OverridesCtx { inner, overrides: Arc::new(overrides) })
    }

    fn wrap_child(inner: Ctx, overrides: Arc<OverrideMap>) -> Ctx {
        Ctx::from_ops(OverridesCtx { inner, overrides })
    }

    /// Follows the substitution chain starting at `model`, returning the
    /// model that should actually run.
    fn resolve<'a>(&'a self, model: &'a Model) -> Result<&'a Model, ContextError> {
        let mut current = model;
        for _ in 0..MAX_OVERRIDE_DEPTH {
            match self.overrides.get(current.display_name()) {
                Some(next) if next.display_name() == current.display_name() => return Ok(current),
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
        Err(ContextError::OverrideCycle { display_name: model.display_name().to_string() })
    }
}

#[async_trait]
impl ContextOps for OverridesCtx {
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
        OverridesCtx::wrap_child(child_inner, self.overrides.clone())
    }

    async fn resolve(&self, fut: ModelFuture) -> Result<Value, ContextError> {
        self.inner.resolve(fut).await
    }

    async fn request(&self, me: Ctx, model: &Model, props: Props) -> Result<Value, ContextError> {
        let resolved = self.resolve(model)?;
        if resolved.display_name() != model.display_name() {
            tracing::debug!(
                target: "reqctx",
                from = model.display_name(),
                to = resolved.display_name(),
                "overrides.substitute"
            );
        }
        self.inner.as_ops().request(me, resolved, props).await
    }

    fn set(&self, _me: Ctx, model: &Model, value: Value, props: Option<Props>) -> Result<(), ContextError> {
        self.inner.set(model, value, props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn override_substitutes_model_body() {
        let root = Ctx::root("root");
        let real = Model::sync("GetUser", |_| Ok(json!({"source": "real"})));
        let fake = Model::sync("GetUser", |_| Ok(json!({"source": "fake"})));

        let mut overrides = OverrideMap::new();
        overrides.insert(SmolStr::new("GetUser"), fake);
        let ctx = OverridesCtx::wrap(root, overrides);

        let result = ctx.request(&real, Props::empty()).await.unwrap();
        assert_eq!(result, json!({"source": "fake"}));
    }

    #[tokio::test]
    async fn no_override_runs_original_model() {
        let root = Ctx::root("root");
        let real = Model::sync("GetUser", |_| Ok(json!({"source": "real"})));
        let ctx = OverridesCtx::wrap(root, OverrideMap::new());
        let result = ctx.request(&real, Props::empty()).await.unwrap();
        assert_eq!(result, json!({"source": "real"}));
    }

    #[tokio::test]
    async fn self_referential_override_is_not_a_cycle_error() {
        let root = Ctx::root("root");
        let real = Model::sync("GetUser", |_| Ok(json!("real")));
        let mut overrides = OverrideMap::new();
        overrides.insert(SmolStr::new("GetUser"), Model::sync("GetUser", |_| Ok(json!("real"))));
        let ctx = OverridesCtx::wrap(root, overrides);
        let result = ctx.request(&real, Props::empty()).await;
        assert!(result.is_ok());
    }
}
