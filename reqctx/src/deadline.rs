//! The deadline layer: an absolute time past which the context tree is
//! killed and every in-flight `resolve()` is interrupted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqctx_core::context::ContextOps;
use reqctx_core::model::{Model, ModelFuture, Tags};
use reqctx_core::props::Props;
use reqctx_core::registry::Registry;
use reqctx_core::{Ctx, ContextError};
use serde_json::Value;

/// Wraps `inner` so that it (and every descendant created from it) dies
/// once `timeout` elapses.
pub struct DeadlineCtx {
    inner: Ctx,
    deadline: Instant,
}

impl DeadlineCtx {
    /// Arm a deadline relative to now. A zero (or otherwise non-positive)
    /// timeout is treated as "no deadline" rather than "already expired" —
    /// it returns `inner` unwrapped instead of a context that can never do
    /// any work.
    pub fn wrap(inner: Ctx, timeout: Duration) -> Ctx {
        if timeout.is_zero() {
            return inner;
        }
        Ctx::from_ops(DeadlineCtx { inner, deadline: Instant::now() + timeout })
    }

    fn wrap_child(inner: Ctx, deadline: Instant) -> Ctx {
        Ctx::from_ops(DeadlineCtx { inner, deadline })
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[async_trait]
impl ContextOps for DeadlineCtx {
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
        self.inner.is_alive() && !self.expired()
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
        DeadlineCtx::wrap_child(child_inner, self.deadline)
    }

    async fn resolve(&self, fut: ModelFuture) -> Result<Value, ContextError> {
        if self.expired() {
            self.inner.kill();
            return Err(ContextError::Interrupted);
        }
        tokio::select! {
            biased;
            () = tokio::time::sleep_until(self.deadline.into()) => {
                tracing::debug!(target: "reqctx", deadline = ?self.deadline, "deadline.fired");
                self.inner.kill();
                Err(ContextError::Interrupted)
            }
            res = self.inner.resolve(fut) => res,
        }
    }

    async fn request(&self, me: Ctx, model: &Model, props: Props) -> Result<Value, ContextError> {
        self.inner.as_ops().request(me, model, props).await
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
    async fn zero_timeout_is_a_no_op() {
        let root = Ctx::root("root");
        let ctx = DeadlineCtx::wrap(root, Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(ctx.is_alive());

        let model = Model::sync("Fast", |_| Ok(json!("ok")));
        let result = ctx.request(&model, Props::empty()).await;
        assert_eq!(result.unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn deadline_interrupts_a_slow_model() {
        let root = Ctx::root("root");
        let ctx = DeadlineCtx::wrap(root, Duration::from_millis(20));
        let model = Model::asynchronous("Slow", |_props, child| {
            Box::pin(async move {
                let fut: ModelFuture = Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!("too slow"))
                });
                child.resolve(fut).await
            })
        });
        let result = ctx.request(&model, Props::empty()).await;
        assert!(matches!(result, Err(ContextError::Interrupted)));
        assert!(!ctx.is_alive());
    }

    #[tokio::test]
    async fn fast_model_completes_before_deadline() {
        let root = Ctx::root("root");
        let ctx = DeadlineCtx::wrap(root, Duration::from_secs(5));
        let model = Model::sync("Fast", |_props| Ok(json!("ok")));
        let result = ctx.request(&model, Props::empty()).await;
        assert_eq!(result.unwrap(), json!("ok"));
    }
}
