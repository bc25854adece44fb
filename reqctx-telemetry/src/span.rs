//! The telemetry layer: one `tracing` span per context, model
//! invocations recorded as events on the *model's own* span.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqctx_core::context::{Action, ContextOps};
use reqctx_core::model::{project_fields, scalar_attr, Model, ModelFuture, PropsFilter, ResultFilter, Tags};
use reqctx_core::props::Props;
use reqctx_core::registry::Registry;
use reqctx_core::{Ctx, ContextError};
use serde_json::Value;
use tracing::Span;

/// Telemetry hints captured by `request()` for the nested `call()` that
/// actually runs the model body — the one piece of request-local state this
/// layer needs, since `request()` and the `call()` it triggers happen on
/// different levels of the same decorator stack.
#[derive(Clone)]
struct Hints {
    props_filter: PropsFilter,
    result_filter: ResultFilter,
    props: Props,
}

tokio::task_local! {
    static HINTS: RefCell<Option<Hints>>;
}

/// Wraps `inner` so every context (and its descendants) owns a span.
pub struct TelemetryCtx {
    inner: Ctx,
    span: Span,
}

impl TelemetryCtx {
    /// Wrap `inner` in a telemetry-backed span. The new span's parent is
    /// the currently active ambient span (`tracing`'s default behavior for
    /// a span created without an explicit `parent:`), captured once here —
    /// later ambient-span changes do not retroactively reparent it.
    pub fn wrap(inner: Ctx) -> Ctx {
        let name = inner.name().to_string();
        let span = tracing::info_span!(target: "reqctx", "reqctx.context", otel.name = %name);
        tracing::trace!(target: "reqctx", context = %name, "telemetry.span_created");
        Ctx::from_ops(TelemetryCtx { inner, span })
    }

    fn make_child(&self, name: &str) -> (Ctx, Span) {
        let child_inner = self.inner.create(name);
        let span =
            tracing::info_span!(target: "reqctx", parent: &self.span, "reqctx.context", otel.name = %name);
        tracing::trace!(target: "reqctx", context = %name, "telemetry.span_created");
        (Ctx::from_ops(TelemetryCtx { inner: child_inner, span: span.clone() }), span)
    }
}

fn props_tags(filter: &PropsFilter, props: &Props) -> Option<Tags> {
    match filter {
        PropsFilter::None => None,
        PropsFilter::All => Some(project_fields(&props.to_value(), None)),
        PropsFilter::Fields(fields) => Some(project_fields(&props.to_value(), Some(fields))),
    }
}

fn result_tags(filter: &ResultFilter, value: &Value) -> Option<Tags> {
    match filter {
        ResultFilter::None => None,
        ResultFilter::All => Some(project_fields(value, None)),
        ResultFilter::Fields(fields) => Some(project_fields(value, Some(fields))),
        ResultFilter::Scalar(attr) => scalar_attr(value).map(|v| vec![(attr.clone(), v)]),
    }
}

#[async_trait]
impl ContextOps for TelemetryCtx {
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
        if !self.span.is_disabled() {
            self.span.in_scope(|| tracing::trace!(target: "reqctx", "telemetry.span_ended"));
        }
    }

    fn fail(&self, error: ContextError) {
        self.inner.fail(error.clone());
        if !self.span.is_disabled() {
            self.span.in_scope(|| tracing::debug!(target: "reqctx", %error, "telemetry.span_failed"));
        }
    }

    fn event(&self, name: &str, tags: Tags) {
        self.inner.event(name, tags.clone());
        self.span.in_scope(|| tracing::debug!(target: "reqctx", event = name, ?tags, "context.event"));
    }

    fn create(&self, _me: Ctx, name: &str) -> Ctx {
        self.make_child(name).0
    }

    async fn call(&self, _me: Ctx, name: &str, action: Action) -> Result<Value, ContextError> {
        let (child, span) = self.make_child(name);

        let hints = HINTS.try_with(|h| h.borrow().clone()).ok().flatten();
        if let Some(hints) = &hints {
            if let Some(tags) = props_tags(&hints.props_filter, &hints.props) {
                span.in_scope(|| tracing::debug!(target: "reqctx", ?tags, "model.props"));
            }
        }

        let result = {
            use tracing::Instrument;
            action(child.clone()).instrument(span.clone()).await
        };

        match &result {
            Ok(value) => {
                child.end();
                if let Some(hints) = &hints {
                    if let Some(tags) = result_tags(&hints.result_filter, value) {
                        span.in_scope(|| tracing::debug!(target: "reqctx", ?tags, "model.result"));
                    }
                }
            }
            Err(error) => {
                child.fail(error.clone());
                span.in_scope(|| tracing::debug!(target: "reqctx", %error, "model.error"));
            }
        }
        result
    }

    async fn resolve(&self, fut: ModelFuture) -> Result<Value, ContextError> {
        self.inner.resolve(fut).await
    }

    async fn request(&self, me: Ctx, model: &Model, props: Props) -> Result<Value, ContextError> {
        let hints = Hints {
            props_filter: model.props_filter().clone(),
            result_filter: model.result_filter().clone(),
            props: props.clone(),
        };
        let fut = self.inner.as_ops().request(me, model, props);
        HINTS.scope(RefCell::new(Some(hints)), fut).await
    }

    fn set(&self, _me: Ctx, model: &Model, value: Value, props: Option<Props>) -> Result<(), ContextError> {
        self.inner.set(model, value, props)
    }
}
