//! In-process metrics for the JWT Pizza service, pushed to a remote
//! time-series collector.
//!
//! Request handlers record into a shared [`Accumulator`]: request counts by
//! method, logins and logouts, auth failures, purchase outcomes and revenue,
//! request latencies and pizza-creation latencies. An [`Exporter`] running on
//! its own task wakes up on a fixed interval, drains the accumulator, samples
//! host CPU load and memory with a [`Sampler`], encodes everything with an
//! [`Encoder`] into an OTLP-style JSON body, and POSTs it to the collector.
//!
//! The pieces:
//!
//! - [`Accumulator`]: counters are cumulative and never reset. Latency
//!   samples are interval-scoped: each export reports the maximum since the
//!   previous export and clears the list.
//! - [`middleware`]: axum hooks that count requests and time responses.
//! - [`Exporter`]: one export per tick, no retries. A failed push is logged
//!   and the batch is dropped. Nothing the exporter does can fail a request.
//! - [`ExporterConfig`]: collector URL, API key, source label, interval and
//!   timeout, from TOML or the environment.
//!
//! The [`run_exporter`] function builds an [`Exporter`] and spawns it,
//! returning an [`ExporterHandle`] that stops it again. Tests usually skip the
//! timer and call [`Exporter::tick`] directly.
//!
//! The library also provides [`init_tracing`] and [`init_metrics`] for
//! subscriber setup and the exporter's own Prometheus telemetry. Typically
//! these functions belong in the binary, but they live here so every service
//! embedding the exporter sets things up the same way.

mod accumulator;
pub use accumulator::{Accumulator, Snapshot, TransactionOutcome};

mod batch;
pub use batch::Batch;

mod config;
pub use config::ExporterConfig;

mod encode;
pub use encode::{
    AggregationTemporality, AnyValue, DataPoint, Encoder, Gauge, KeyValue, Metric, MetricData,
    MetricKind, MetricsPayload, NumberValue, ResourceMetrics, SOURCE_ATTRIBUTE, ScopeMetrics, Sum,
};

mod error;
pub use error::{ConfigError, ExportError};

mod exporter;
pub use exporter::{ExportStatus, Exporter, ExporterHandle, encode_snapshot};

pub(crate) mod metrics;
pub use crate::metrics::init_metrics;

pub mod middleware;

mod sampler;
pub use sampler::{Sampler, load_percent, memory_percent};

mod trace;
pub use trace::init_tracing;

use std::sync::Arc;

/// Build an [`Exporter`] for `accumulator` and start its timer.
///
/// Must be called from within a tokio runtime. Fails only if the HTTP client
/// cannot be built.
pub fn run_exporter(
    accumulator: Arc<Accumulator>,
    config: &ExporterConfig,
) -> Result<ExporterHandle, ExportError> {
    let exporter = Exporter::new(accumulator, config)?;
    tracing::info!(
        url = %config.url,
        source = %config.source,
        interval_ms = config.interval_ms,
        "starting metrics exporter"
    );
    Ok(exporter.spawn())
}
