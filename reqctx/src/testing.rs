//! In-memory fixtures for exercising the layer stack's invariants directly,
//! rather than leaving them as prose assertions.
//!
//! Everything here lives behind the `test-support` feature.

use std::sync::Arc;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::SdkTracerProvider;
use reqctx_backend::CacheBackend;
use reqctx_core::{ContextError, Model, Props};
use reqctx_memory::MapBackend;
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;

/// A fresh, unbounded [`MapBackend`] behind the [`CacheBackend`] trait
/// object the cache layer expects.
pub fn memory_backend() -> Arc<dyn CacheBackend> {
    Arc::new(MapBackend::builder().label("test").build())
}

/// A model whose body always succeeds with `value`, ignoring its props.
pub fn constant_model(display_name: impl Into<smol_str::SmolStr>, value: Value) -> Model {
    Model::sync(display_name, move |_props| Ok(value.clone()))
}

/// A model whose body always fails, for exercising interruption and
/// memoization-forgetting paths.
pub fn failing_model(display_name: impl Into<smol_str::SmolStr>, message: &'static str) -> Model {
    Model::sync(display_name, move |_props| Err(ContextError::model(message, std::io::Error::other(message))))
}

/// A model body that records every invocation's props, for asserting a
/// model ran exactly once (or not at all) under memoization.
pub fn counting_model(
    display_name: impl Into<smol_str::SmolStr>,
    value: Value,
) -> (Model, Arc<std::sync::atomic::AtomicUsize>) {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = calls.clone();
    let model = Model::sync(display_name, move |_props: &Props| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(value.clone())
    });
    (model, calls)
}

/// A tracer provider backed by an [`InMemorySpanExporter`], installed as the
/// default `tracing` subscriber for the lifetime of the returned guard.
///
/// Exported spans (and their parent/child relationships and attributes) are
/// available via [`RecordedSpans::finished_spans`] once the context tree
/// under test has ended.
pub struct RecordedSpans {
    exporter: InMemorySpanExporter,
    provider: SdkTracerProvider,
    _guard: tracing::subscriber::DefaultGuard,
}

impl RecordedSpans {
    /// Installs an in-memory tracer as the default subscriber for the
    /// current thread. Drop the returned value to restore the previous
    /// subscriber and shut the provider down.
    pub fn install() -> Self {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder().with_simple_exporter(exporter.clone()).build();
        let tracer = provider.tracer("reqctx-test-support");
        let subscriber = tracing_subscriber::registry().with(tracing_opentelemetry::layer().with_tracer(tracer));
        let guard = tracing::subscriber::set_default(subscriber);
        RecordedSpans { exporter, provider, _guard: guard }
    }

    /// Every span that has finished so far, oldest first.
    pub fn finished_spans(&self) -> Vec<opentelemetry_sdk::trace::SpanData> {
        self.exporter.get_finished_spans().unwrap_or_default()
    }

    /// Forces any buffered spans to flush before inspecting them.
    pub fn flush(&self) {
        let _ = self.provider.force_flush();
    }
}
