//! The exporter's own telemetry. Check the docs for [`init_metrics`].

use crate::ExportError;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::{sync::LazyLock, time::Duration};

const BATCHES_BUILT: &str = "pizza_metrics.batches_built";
const BATCHES_BUILT_DESC: &str = "The total number of metric batches built by the exporter";

pub(crate) const BATCHES_LIVE: &str = "pizza_metrics.batches_live";
const BATCHES_LIVE_DESC: &str = "The number of batches built but not yet pushed or dropped";

const BATCH_SIZE: &str = "pizza_metrics.batch_size";
const BATCH_SIZE_DESC: &str = "The number of metrics in each batch";

const PUSH_DURATION: &str = "pizza_metrics.push_duration_ms";
const PUSH_DURATION_DESC: &str = "Wall-clock time of each push to the collector";

const PUSH_FAILURES: &str = "pizza_metrics.push_failures";
const PUSH_FAILURES_DESC: &str = "The total number of batches dropped, labeled by reason";

static DESCRIBE: LazyLock<()> = LazyLock::new(|| {
    metrics::describe_counter!(BATCHES_BUILT, BATCHES_BUILT_DESC);
    metrics::describe_gauge!(BATCHES_LIVE, BATCHES_LIVE_DESC);
    metrics::describe_histogram!(BATCH_SIZE, metrics::Unit::Count, BATCH_SIZE_DESC);
    metrics::describe_histogram!(PUSH_DURATION, metrics::Unit::Milliseconds, PUSH_DURATION_DESC);
    metrics::describe_counter!(PUSH_FAILURES, PUSH_FAILURES_DESC);
});

pub(crate) fn record_batch(len: usize) {
    counter!(BATCHES_BUILT).increment(1);
    gauge!(BATCHES_LIVE).increment(1);
    histogram!(BATCH_SIZE).record(len as f64);
}

pub(crate) fn record_push(elapsed: Duration, result: Result<(), &ExportError>) {
    histogram!(PUSH_DURATION).record(elapsed.as_secs_f64() * 1000.0);
    if let Err(err) = result {
        counter!(PUSH_FAILURES, "reason" => err.reason()).increment(1);
    }
}

/// Install a Prometheus scrape endpoint for the exporter's own telemetry on
/// the given port, or 9000 if `None`. Returns the port.
///
/// This is separate from the collector push. The collector receives the
/// application metrics held in the [`Accumulator`]. The Prometheus endpoint
/// exposes how the exporter itself is doing:
///
/// - `pizza_metrics.batches_built` (counter): batches built since startup.
/// - `pizza_metrics.batches_live` (gauge): batches built and not yet
///   resolved. A value that keeps growing means pushes are hanging.
/// - `pizza_metrics.batch_size` (histogram): metrics per batch.
/// - `pizza_metrics.push_duration_ms` (histogram): time spent per push.
/// - `pizza_metrics.push_failures` (counter): dropped batches, labeled by
///   `reason` (`transport`, `timeout`, `status`). The `client` reason of
///   [`ExportError`] is only produced while building an exporter, never by a
///   push, so it does not show up here.
///
/// Without an installed recorder all of the above are no-ops, so calling this
/// is optional. It must be called from within a tokio runtime.
///
/// [`Accumulator`]: crate::Accumulator
pub fn init_metrics(port: Option<u16>) -> Result<u16, BuildError> {
    LazyLock::force(&DESCRIBE);
    let port = port.unwrap_or(9000);
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;
    Ok(port)
}
