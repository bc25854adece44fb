//! The concrete end-to-end scenarios a layered context must satisfy,
//! asserted against the in-memory backend and in-memory span recorder
//! instead of left as prose.

#![cfg(feature = "test-support")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqctx::cache::{CacheConfig, CacheCtx};
use reqctx::overrides::{OverrideMap, OverridesCtx};
use reqctx::testing::{constant_model, counting_model, memory_backend, RecordedSpans};
use reqctx_core::{CacheStrategy, ContextError, Ctx, Model, Props};
use reqctx_telemetry::TelemetryCtx;
use serde_json::{json, Value};

#[tokio::test]
async fn memoize_get_user() {
    let ctx = Ctx::root("r");
    let (model, calls) = counting_model("GetUser", json!({"id": 1, "name": "A"}));

    let first = ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();
    let second = ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();

    assert_eq!(first, json!({"id": 1, "name": "A"}));
    assert_eq!(second, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn kill_mid_flight_interrupts_and_poisons_subsequent_requests() {
    let ctx = Ctx::root("r");
    let child = ctx.create("worker");
    let writes = Arc::new(AtomicUsize::new(0));
    let backend_writes = writes.clone();

    let slow: reqctx_core::model::ModelFuture = Box::pin(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        backend_writes.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"r": 1}))
    });

    let resolving = child.resolve(slow);
    tokio::time::sleep(Duration::from_millis(1)).await;
    ctx.kill();
    let result = resolving.await;
    assert!(matches!(result, Err(ContextError::Interrupted)));

    let model = Model::sync("AnyModel", |_| Ok(json!("unused")));
    let retried = ctx.request(&model, Props::empty()).await;
    assert!(matches!(retried, Err(ContextError::Interrupted)));
    assert_eq!(writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_first_hit_is_shared_by_sibling_contexts() {
    let backend = memory_backend();
    let counter = Arc::new(AtomicUsize::new(0));
    let body_counter = counter.clone();
    let model = Model::sync("Counter", move |_props| {
        let n = body_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({"result": n}))
    })
    .with_cache_strategy(CacheStrategy::CacheFirst);

    let config = CacheConfig::new(Duration::from_secs(3600));
    let first_ctx = CacheCtx::wrap(Ctx::root("r1"), backend.clone(), config.clone());
    let second_ctx = CacheCtx::wrap(Ctx::root("r2"), backend, config);

    let first = first_ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();
    let second = second_ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();

    assert_eq!(first, json!({"result": 1}));
    assert_eq!(second, json!({"result": 1}));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn model_without_cache_strategy_bypasses_the_cache_layer() {
    let backend = memory_backend();
    let (model, calls) = counting_model("Uncached", json!({"result": 1}));
    let config = CacheConfig::new(Duration::from_secs(3600));
    let ctx = CacheCtx::wrap(Ctx::root("r"), backend.clone(), config);

    ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();
    ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let key = reqctx_core::Key::new(model.display_name(), &Props::from_value(json!({"id": 1})));
    assert!(backend.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn network_only_never_writes_to_the_backend() {
    let backend = memory_backend();
    let (model, calls) = counting_model("Counter", json!({"result": 1}));
    let model = model.with_cache_strategy(CacheStrategy::NetworkOnly);
    let config = CacheConfig::new(Duration::from_secs(3600));
    let ctx = CacheCtx::wrap(Ctx::root("r"), backend.clone(), config);

    ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();
    ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let key = reqctx_core::Key::new(model.display_name(), &Props::from_value(json!({"id": 1})));
    assert!(backend.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn cache_only_miss_returns_null_instead_of_erroring() {
    let backend = memory_backend();
    let model = Model::sync("Counter", |_props| panic!("cache-only must not run the model"))
        .with_cache_strategy(CacheStrategy::CacheOnly);
    let config = CacheConfig::new(Duration::from_secs(3600));
    let ctx = CacheCtx::wrap(Ctx::root("r"), backend, config);

    let result = ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn stale_while_revalidate_refreshes_exactly_once_in_the_background() {
    let backend = memory_backend();
    let counter = Arc::new(AtomicUsize::new(0));
    let body_counter = counter.clone();
    let model = Model::sync("Counter", move |_props| {
        let n = body_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({"result": n}))
    })
    .with_cache_strategy(CacheStrategy::StaleWhileRevalidate)
    .with_cache_stale_ttl(Duration::from_millis(0));

    let config = CacheConfig::new(Duration::from_secs(3600));
    let first_ctx = CacheCtx::wrap(Ctx::root("r1"), backend.clone(), config.clone());
    let second_ctx = CacheCtx::wrap(Ctx::root("r2"), backend, config);

    let first = first_ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();
    assert_eq!(first, json!({"result": 1}));

    tokio::time::sleep(Duration::from_millis(5)).await;

    let second = second_ctx.request(&model, Props::from_value(json!({"id": 1}))).await.unwrap();
    assert_eq!(second, json!({"result": 1}));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn overrides_are_transitive() {
    let mut overrides = OverrideMap::new();
    overrides.insert("A".into(), constant_model("B", json!("from-b")));
    overrides.insert("B".into(), constant_model("C", json!("from-c")));
    let ctx = OverridesCtx::wrap(Ctx::root("r"), overrides);

    let model_a = Model::sync("A", |_| panic!("A's own body must not run"));
    let result = ctx.request(&model_a, Props::empty()).await.unwrap();
    assert_eq!(result, json!("from-c"));
}

#[tokio::test]
async fn wrapping_under_an_ambient_span_parents_the_root_span_on_it() {
    let recorder = RecordedSpans::install();

    let ambient = tracing::info_span!("inbound-request", otel.name = "ambient");
    let ctx = {
        let _entered = ambient.enter();
        TelemetryCtx::wrap(Ctx::root("r"))
    };
    drop(ambient);
    ctx.end();
    drop(ctx);
    recorder.flush();

    let spans = recorder.finished_spans();
    let ambient_span = spans.iter().find(|s| s.name.as_ref() == "ambient").expect("ambient span recorded");
    let root_span = spans.iter().find(|s| s.name.as_ref() == "r").expect("root context span recorded");

    assert_eq!(root_span.parent_span_id, ambient_span.span_context.span_id());
    assert_eq!(root_span.span_context.trace_id(), ambient_span.span_context.trace_id());
}

#[tokio::test]
async fn parallel_root_contexts_under_distinct_ambient_spans_stay_isolated() {
    let recorder = RecordedSpans::install();

    let span_a = tracing::info_span!("ambient-a", otel.name = "a");
    let ctx_a = {
        let _entered = span_a.enter();
        TelemetryCtx::wrap(Ctx::root("root-a"))
    };
    drop(span_a);

    let span_b = tracing::info_span!("ambient-b", otel.name = "b");
    let ctx_b = {
        let _entered = span_b.enter();
        TelemetryCtx::wrap(Ctx::root("root-b"))
    };
    drop(span_b);

    ctx_a.end();
    ctx_b.end();
    drop(ctx_a);
    drop(ctx_b);
    recorder.flush();

    let spans = recorder.finished_spans();
    let a = spans.iter().find(|s| s.name.as_ref() == "a").unwrap();
    let b = spans.iter().find(|s| s.name.as_ref() == "b").unwrap();
    let root_a = spans.iter().find(|s| s.name.as_ref() == "root-a").unwrap();
    let root_b = spans.iter().find(|s| s.name.as_ref() == "root-b").unwrap();

    assert_eq!(root_a.parent_span_id, a.span_context.span_id());
    assert_eq!(root_b.parent_span_id, b.span_context.span_id());
    assert_ne!(a.span_context.trace_id(), b.span_context.trace_id());
}
