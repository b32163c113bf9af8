//! Tracing subscriber setup. Check the docs for [`init_tracing`].

use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "pizza-metrics";

/// Install the global tracing subscriber and return the OpenTelemetry tracer
/// provider backing it.
///
/// - Log level comes from `RUST_LOG`, defaulting to `info`.
/// - Events are printed to stdout, as JSON when `LOG_FORMAT=json`.
/// - When `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are batched and sent
///   there over OTLP/HTTP. Otherwise spans are still created, so span fields
///   show up in log lines, but they go nowhere else.
///
/// Keep the returned provider alive and call
/// [`SdkTracerProvider::shutdown`] before exiting so buffered spans are
/// flushed.
///
/// Like [`crate::init_metrics`], this belongs in a binary. It is here so the
/// demos and downstream services set things up the same way.
pub fn init_tracing() -> eyre::Result<SdkTracerProvider> {
    let resource = Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_attribute(KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")))
        .build();

    let mut builder = SdkTracerProvider::builder().with_resource(resource);
    if std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .build()?;
        builder = builder.with_batch_exporter(exporter);
    }
    let provider = builder.build();

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .with(tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)))
        .try_init()?;

    Ok(provider)
}
