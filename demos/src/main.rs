//! Walks a handful of capability-layer scenarios against a fully
//! composed context: a deadline, a cache, an override, and a telemetry
//! span stacked on a plain in-memory backend.
//!
//! Run:
//!
//! ```text
//! cargo run -p reqctx-demos
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqctx::{CacheConfig, ContextConfig};
use reqctx_backend::CacheBackend;
use reqctx_core::{CacheStrategy, FieldProjection, Model, Props, PropsFilter, Registry, ResultFilter};
use reqctx_memory::MapBackend;
use reqctx_telemetry::TelemetryConfig;
use serde_json::json;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(true).init();

    let backend: Arc<dyn CacheBackend> = Arc::new(MapBackend::builder().max_entries(1_000).build());

    let ctx = ContextConfig::new()
        .with_deadline(Duration::from_secs(2))
        .with_cache(CacheConfig::new(Duration::from_secs(30)).with_provider("memory"))
        .with_telemetry(TelemetryConfig::new("reqctx-demo"))
        .with_override("Greeting", Model::sync("Greeting", |_| Ok(json!({"text": "overridden"}))))
        .build("demo", Arc::new(Registry::new()), backend);

    let calls = Arc::new(AtomicUsize::new(0));
    let fetches = calls.clone();
    let get_user = Model::sync("GetUser", move |props| {
        fetches.fetch_add(1, Ordering::SeqCst);
        let id = props.get("id").and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(json!({"id": id, "name": "ada"}))
    })
    .with_props_filter(PropsFilter::All)
    .with_result_filter(ResultFilter::Fields(Arc::from([FieldProjection::same("id")])))
    .with_cache_strategy(CacheStrategy::CacheFirst);

    let first = ctx.request(&get_user, Props::from_value(json!({"id": 1}))).await.unwrap();
    let second = ctx.request(&get_user, Props::from_value(json!({"id": 1}))).await.unwrap();
    tracing::info!(first = %first, second = %second, fetches = calls.load(Ordering::SeqCst), "cache_first_demo_done");

    let greeting = Model::sync("Greeting", |_| Ok(json!({"text": "hello"})));
    let overridden = ctx.request(&greeting, Props::empty()).await.unwrap();
    tracing::info!(result = %overridden, "override_demo_done");
}
