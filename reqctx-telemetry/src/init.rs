//! OpenTelemetry OTLP provider bootstrap.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Settings for [`init`].
pub struct TelemetryConfig {
    /// Reported as the OTel resource's `service.name`, and used to name the
    /// tracer handed to `tracing-opentelemetry`.
    pub service_name: String,
    /// Where to send OTLP spans. Defaults to the collector's standard gRPC port.
    pub otlp_endpoint: String,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        TelemetryConfig { service_name: service_name.into(), otlp_endpoint: "http://localhost:4317".to_string() }
    }

    pub fn with_otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }
}

/// Builds an OTLP tracer provider, installs a `tracing-opentelemetry` layer
/// alongside an `fmt` layer on the global `tracing` subscriber, and returns
/// the provider so the caller can `shutdown()` it at process exit.
///
/// Call once, near the top of `main`.
pub fn init(config: &TelemetryConfig) -> Result<SdkTracerProvider, Box<dyn std::error::Error>> {
    let exporter = SpanExporter::builder().with_tonic().with_endpoint(&config.otlp_endpoint).build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(Resource::builder_empty().with_service_name(config.service_name.clone()).build())
        .build();

    let tracer = tracer_provider.tracer(config.service_name.clone());
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .with(otel_layer)
        .with(Targets::new().with_target("reqctx", Level::TRACE).with_default(Level::INFO))
        .init();

    Ok(tracer_provider)
}
