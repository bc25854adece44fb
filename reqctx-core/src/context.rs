//! The base context: the lifecycle primitives (`create`, `call`, `end`,
//! `fail`, `event`, `resolve`) and the models-layer memoization algorithm
//! (`request`, `set`) that every capability layer wraps.
//!
//! Capability layers (deadline, overrides, cache, telemetry) are decorators:
//! each one holds the `Ctx` it wraps and implements [`ContextOps`] itself,
//! intercepting the operations it cares about and delegating the rest
//! straight through. [`Ctx`] is the `Arc`-backed handle every caller holds;
//! `ContextOps` is the trait-object interface the decorators implement.

use async_trait::async_trait;
use serde_json::Value;
use smol_str::SmolStr;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;

use crate::error::ContextError;
use crate::key::Key;
use crate::model::{Model, ModelBody, ModelFuture, Tags};
use crate::props::Props;
use crate::registry::Registry;

/// A boxed, one-shot action run against a freshly created child context.
/// The common shape of both `call()`'s body and a model invocation.
pub type Action = Box<dyn FnOnce(Ctx) -> ModelFuture + Send>;

/// The decorator interface every context layer implements.
///
/// Every method takes `me: Ctx` wherever it needs to hand a self-reference
/// to callees (`create`'s new child's parent link, `call`'s child, the
/// memoization engine's own re-entrant calls) — this sidesteps needing
/// `Arc<Self>` receivers, which trait objects can't express once multiple
/// concrete types implement the trait.
#[async_trait]
pub trait ContextOps: Send + Sync {
    fn name(&self) -> &str;
    fn parent(&self) -> Option<&Ctx>;
    fn start_time(&self) -> Instant;
    fn end_time(&self) -> Option<Instant>;
    fn error(&self) -> Option<ContextError>;
    fn registry(&self) -> &Arc<Registry>;

    fn is_alive(&self) -> bool;
    fn kill(&self);
    fn end(&self);
    fn fail(&self, error: ContextError);
    fn event(&self, name: &str, tags: Tags);

    fn create(&self, me: Ctx, name: &str) -> Ctx;

    /// Runs `action` against a freshly created child, ending or failing it
    /// with the outcome.
    ///
    /// This is a default method, not per-layer: every layer's `create()`
    /// already returns a correctly decorated child, so the "create, run,
    /// settle" shape is identical regardless of which layers are stacked.
    /// Only the telemetry layer overrides it, to additionally wrap the
    /// child's lifetime in a span.
    async fn call(&self, me: Ctx, name: &str, action: Action) -> Result<Value, ContextError> {
        let child = self.create(me, name);
        tracing::trace!(target: "reqctx", model = name, "call.start");
        let result = action(child.clone()).await;
        match &result {
            Ok(_) => child.end(),
            Err(error) => child.fail(error.clone()),
        }
        tracing::trace!(target: "reqctx", model = name, ok = result.is_ok(), "call.end");
        result
    }

    async fn resolve(&self, fut: ModelFuture) -> Result<Value, ContextError>;
    async fn request(&self, me: Ctx, model: &Model, props: Props) -> Result<Value, ContextError>;
    fn set(&self, me: Ctx, model: &Model, value: Value, props: Option<Props>) -> Result<(), ContextError>;

    /// Turns off the cache layer's reads and writes for the rest of this
    /// context tree. A no-op on every layer except the cache layer, which
    /// overrides it; everything else just needs the default so the call
    /// is always legal regardless of which layers are stacked.
    fn disable_cache(&self) {}

    /// Whether the cache layer (if present) should read/write on behalf of
    /// this context. Always `true` unless a cache layer further down the
    /// stack, or an ancestor's [`ContextOps::disable_cache`], said otherwise.
    fn should_cache(&self) -> bool {
        true
    }
}

/// The public handle to a context node.
///
/// Cheap to clone (one `Arc` bump). Every capability layer produces and
/// consumes this same type, which is what lets `reqctx`'s `compose`
/// function chain an arbitrary stack of layers without either side knowing
/// the other's concrete type.
#[derive(Clone)]
pub struct Ctx(Arc<dyn ContextOps>);

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx").field("name", &self.name()).field("alive", &self.is_alive()).finish()
    }
}

impl Ctx {
    /// Wrap an arbitrary [`ContextOps`] implementor as a handle. Capability
    /// layers use this to turn their own decorator struct into a `Ctx` once
    /// it has been built around the context it wraps.
    pub fn from_ops(ops: impl ContextOps + 'static) -> Self {
        Ctx(Arc::new(ops))
    }

    /// Escape hatch for decorators that need to forward an explicit `me`
    /// down the chain (e.g. a pass-through layer's `request()` delegating
    /// to its inner context while keeping the *original, outermost*
    /// handle as `me`, so a later `call()` re-wraps through every layer
    /// rather than restarting from the inner layer's own identity).
    pub fn as_ops(&self) -> &dyn ContextOps {
        self.0.as_ref()
    }

    /// Start a fresh root context with its own registry and liveness cell.
    pub fn root(name: impl Into<SmolStr>) -> Self {
        Self::root_with_registry(name, Arc::new(Registry::new()))
    }

    /// Start a fresh root context against a caller-supplied registry — lets
    /// a caller pre-seed model values via [`Registry::set`] before the
    /// layer stack is built, or share one registry across contexts it
    /// otherwise manages independently.
    pub fn root_with_registry(name: impl Into<SmolStr>, registry: Arc<Registry>) -> Self {
        let root = Arc::new(RootState::new());
        Ctx(Arc::new(BaseCtx::new(name.into(), None, root, registry)))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn parent(&self) -> Option<&Ctx> {
        self.0.parent()
    }

    pub fn start_time(&self) -> Instant {
        self.0.start_time()
    }

    pub fn end_time(&self) -> Option<Instant> {
        self.0.end_time()
    }

    pub fn error(&self) -> Option<ContextError> {
        self.0.error()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.0.registry()
    }

    pub fn is_alive(&self) -> bool {
        self.0.is_alive()
    }

    pub fn kill(&self) {
        self.0.kill();
    }

    pub fn end(&self) {
        self.0.end();
    }

    pub fn fail(&self, error: ContextError) {
        self.0.fail(error);
    }

    pub fn event(&self, name: &str, tags: Tags) {
        self.0.event(name, tags);
    }

    pub fn create(&self, name: &str) -> Ctx {
        self.0.create(self.clone(), name)
    }

    pub async fn call(&self, name: &str, action: Action) -> Result<Value, ContextError> {
        self.0.call(self.clone(), name, action).await
    }

    /// Drives `fut` to completion, racing it against this context (and, in
    /// the deadline layer, a timer) dying. This is the one place a model
    /// body's `.await` becomes interruptible rather than running to
    /// completion regardless of liveness.
    pub async fn resolve(&self, fut: ModelFuture) -> Result<Value, ContextError> {
        self.0.resolve(fut).await
    }

    pub async fn request(&self, model: &Model, props: Props) -> Result<Value, ContextError> {
        self.0.request(self.clone(), model, props).await
    }

    pub fn set(&self, model: &Model, value: Value, props: Option<Props>) -> Result<(), ContextError> {
        self.0.set(self.clone(), model, value, props)
    }

    pub fn disable_cache(&self) {
        self.0.disable_cache();
    }

    pub fn should_cache(&self) -> bool {
        self.0.should_cache()
    }
}

/// Liveness shared by every node descended from the same root.
///
/// A `watch` channel rather than a bare `AtomicBool` because `resolve()`
/// needs to *wait* for death, not just poll for it.
struct RootState {
    alive: watch::Sender<bool>,
}

impl RootState {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        RootState { alive: tx }
    }

    fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    fn kill(&self) {
        let _ = self.alive.send(false);
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.alive.subscribe()
    }
}

async fn wait_for_death(rx: &mut watch::Receiver<bool>) {
    loop {
        if !*rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

struct LifecycleState {
    end_time: Option<Instant>,
    error: Option<ContextError>,
}

/// The bottom of every layer stack: lifecycle bookkeeping plus the
/// memoization/dispatch algorithm behind `request()`.
pub struct BaseCtx {
    name: SmolStr,
    parent: Option<Ctx>,
    start_time: Instant,
    state: Mutex<LifecycleState>,
    root: Arc<RootState>,
    registry: Arc<Registry>,
}

impl BaseCtx {
    fn new(name: SmolStr, parent: Option<Ctx>, root: Arc<RootState>, registry: Arc<Registry>) -> Self {
        BaseCtx {
            name,
            parent,
            start_time: Instant::now(),
            state: Mutex::new(LifecycleState { end_time: None, error: None }),
            root,
            registry,
        }
    }
}

#[async_trait]
impl ContextOps for BaseCtx {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<&Ctx> {
        self.parent.as_ref()
    }

    fn start_time(&self) -> Instant {
        self.start_time
    }

    fn end_time(&self) -> Option<Instant> {
        self.state.lock().unwrap().end_time
    }

    fn error(&self) -> Option<ContextError> {
        self.state.lock().unwrap().error.clone()
    }

    fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn is_alive(&self) -> bool {
        self.root.is_alive()
    }

    fn kill(&self) {
        self.root.kill();
    }

    fn end(&self) {
        let mut state = self.state.lock().unwrap();
        if state.end_time.is_none() {
            state.end_time = Some(Instant::now());
        }
    }

    fn fail(&self, error: ContextError) {
        let mut state = self.state.lock().unwrap();
        if state.end_time.is_none() {
            state.end_time = Some(Instant::now());
        }
        state.error.get_or_insert(error);
    }

    fn event(&self, name: &str, tags: Tags) {
        tracing::debug!(target: "reqctx", context = %self.name, event = name, ?tags, "context.event");
    }

    fn create(&self, me: Ctx, name: &str) -> Ctx {
        Ctx(Arc::new(BaseCtx::new(SmolStr::new(name), Some(me), self.root.clone(), self.registry.clone())))
    }

    async fn resolve(&self, fut: ModelFuture) -> Result<Value, ContextError> {
        if !self.root.is_alive() {
            return Err(ContextError::Interrupted);
        }
        let mut rx = self.root.subscribe();
        tokio::select! {
            biased;
            () = wait_for_death(&mut rx) => Err(ContextError::Interrupted),
            res = fut => res,
        }
    }

    async fn request(&self, me: Ctx, model: &Model, props: Props) -> Result<Value, ContextError> {
        if model.display_name().is_empty() {
            return Err(ContextError::MissingDisplayName);
        }
        if !self.is_alive() {
            return Err(ContextError::Interrupted);
        }

        let key = Key::new(model.display_name(), &props);
        let registry = Arc::clone(&self.registry);
        let body = model.body().clone();
        let display_name = model.display_name().to_string();
        let forget_key = key.clone();

        let outcome = registry.get_or_create(key, move || {
            let body = body.clone();
            let props = props.clone();
            let me = me.clone();
            Box::pin(async move {
                let body = body.clone();
                me.call(
                    &display_name,
                    Box::new(move |child: Ctx| -> ModelFuture {
                        let body = body.clone();
                        let props = props.clone();
                        Box::pin(async move {
                            let fut: ModelFuture = match body {
                                ModelBody::Sync(f) => {
                                    let props = props.clone();
                                    Box::pin(async move { f(&props) })
                                }
                                ModelBody::Async(f) => f(props, child.clone()),
                            };
                            child.resolve(fut).await
                        })
                    }),
                )
                .await
            })
        });

        let result = outcome.await;
        if result.is_err() {
            registry.forget(&forget_key);
        }
        result
    }

    fn set(&self, _me: Ctx, model: &Model, value: Value, props: Option<Props>) -> Result<(), ContextError> {
        if model.display_name().is_empty() {
            return Err(ContextError::MissingDisplayName);
        }
        let props = props.unwrap_or_else(Props::empty);
        let key = Key::new(model.display_name(), &props);
        self.registry.set(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn request_memoizes_concurrent_calls_for_same_key() {
        let ctx = Ctx::root("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model = Model::sync("GetUser", move |_props| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"id": 1}))
        });

        let a = ctx.request(&model, Props::empty());
        let b = ctx.request(&model, Props::empty());
        let (ra, rb) = tokio::join!(a, b);

        assert_eq!(ra.unwrap(), json!({"id": 1}));
        assert_eq!(rb.unwrap(), json!({"id": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn kill_interrupts_in_flight_resolve() {
        let ctx = Ctx::root("test");
        let child = ctx.create("child");
        let slow: ModelFuture = Box::pin(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(json!("never"))
        });
        let resolving = child.resolve(slow);
        ctx.kill();
        let result = resolving.await;
        assert!(matches!(result, Err(ContextError::Interrupted)));
    }

    #[tokio::test]
    async fn failed_request_is_forgotten_so_retry_can_succeed() {
        let ctx = Ctx::root("test");
        let attempt = Arc::new(AtomicUsize::new(0));
        let counter = attempt.clone();
        let model = Model::sync("Flaky", move |_props| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ContextError::model("Flaky", std::io::Error::other("boom")))
            } else {
                Ok(json!("ok"))
            }
        });

        let first = ctx.request(&model, Props::empty()).await;
        assert!(first.is_err());
        let second = ctx.request(&model, Props::empty()).await;
        assert_eq!(second.unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn set_then_request_observes_seeded_value_without_running_body() {
        let ctx = Ctx::root("test");
        let model = Model::sync("GetConfig", |_| panic!("body must not run"));
        ctx.set(&model, json!({"flag": true}), None).unwrap();
        let result = ctx.request(&model, Props::empty()).await.unwrap();
        assert_eq!(result, json!({"flag": true}));
    }

    #[test]
    fn child_parent_chain_is_observable() {
        let ctx = Ctx::root("root");
        let child = ctx.create("child");
        assert_eq!(child.parent().unwrap().name(), "root");
    }
}
