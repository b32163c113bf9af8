//! The periodic push to the collector. This module contains the
//! [`Exporter`] struct.

use crate::{
    Accumulator, Batch, Encoder, ExportError, ExporterConfig, Metric, MetricKind, NumberValue,
    Sampler, Snapshot,
};
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, instrument, trace};

/// How one export tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    /// The collector accepted the batch.
    Delivered {
        /// Metrics in the batch.
        metrics: usize,
    },
    /// The push failed and the batch was discarded.
    Dropped {
        /// Metrics in the batch.
        metrics: usize,
    },
}

/// The HTTP half of the exporter. Cheap to clone, so each push can run in
/// its own task.
#[derive(Debug, Clone)]
struct CollectorClient {
    client: Client,
    url: Arc<str>,
    api_key: Arc<str>,
}

impl CollectorClient {
    fn new(config: &ExporterConfig) -> Result<Self, ExportError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ExportError::Client)?;
        Ok(Self {
            client,
            url: config.url.as_str().into(),
            api_key: config.api_key.as_str().into(),
        })
    }

    async fn push(&self, batch: &Batch) -> Result<(), ExportError> {
        let response = self
            .client
            .post(&*self.url)
            .bearer_auth(&self.api_key)
            .json(&batch.payload())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Status(status));
        }
        debug!(%status, metrics = batch.len(), "collector accepted metrics");
        Ok(())
    }

    /// Push and log. Never fails; a failed batch is dropped.
    async fn deliver(&self, batch: Batch) -> ExportStatus {
        let metrics = batch.len();
        let started = Instant::now();
        let result = self.push(&batch).await;
        crate::metrics::record_push(started.elapsed(), result.as_ref().map(|_| ()));

        match result {
            Ok(()) => ExportStatus::Delivered { metrics },
            Err(err) => {
                error!(
                    error = %err,
                    reason = err.reason(),
                    cause = std::error::Error::source(&err).map(tracing::field::display),
                    metrics,
                    "failed to push metrics, dropping batch"
                );
                ExportStatus::Dropped { metrics }
            }
        }
    }
}

/// Drains an [`Accumulator`] on a fixed interval and pushes the encoded
/// metrics to a remote collector.
///
/// Use [`Exporter::spawn`] to run it on its own task. [`Exporter::tick`]
/// runs a single export inline, which is what tests want.
#[derive(Debug)]
pub struct Exporter {
    accumulator: Arc<Accumulator>,
    sampler: Sampler,
    encoder: Encoder,
    collector: CollectorClient,
    interval: Duration,
    ticks: u64,
}

impl Exporter {
    /// Create an exporter for `accumulator`. Fails only if the HTTP client
    /// cannot be built.
    pub fn new(
        accumulator: Arc<Accumulator>,
        config: &ExporterConfig,
    ) -> Result<Self, ExportError> {
        Ok(Self {
            accumulator,
            sampler: Sampler::new(),
            encoder: Encoder::new(config.source.clone()),
            collector: CollectorClient::new(config)?,
            interval: config.interval(),
            ticks: 0,
        })
    }

    /// Drain the accumulator, sample the host, and encode everything.
    ///
    /// Counters are cumulative and stay put. Latency lists are emptied, and
    /// each contributes one metric only if it held samples.
    #[instrument(skip(self), name = "Collecting metrics")]
    pub fn collect(&mut self) -> Vec<Metric> {
        let snapshot = self.accumulator.snapshot();
        let cpu = self.sampler.cpu_load_percent();
        let memory = self.sampler.memory_usage_percent();
        trace!(cpu, memory, "sampled host");
        encode_snapshot(&self.encoder, &snapshot, cpu, memory)
    }

    /// Run one export inline: collect, then push and wait for the result.
    ///
    /// Never fails. A transport fault or non-2xx status logs one error and
    /// drops the batch.
    pub async fn tick(&mut self) -> ExportStatus {
        let batch = self.next_batch();
        let span = batch.span().clone();
        self.collector.deliver(batch).instrument(span).await
    }

    fn next_batch(&mut self) -> Batch {
        let span = info_span!("metrics_export", tick = self.ticks);
        self.ticks = self.ticks.wrapping_add(1);
        let metrics = span.in_scope(|| self.collect());
        Batch::new(metrics, span)
    }

    /// Spawn the exporter loop. The first export happens one full interval
    /// from now.
    ///
    /// Each push runs in its own task so a slow collector never delays the
    /// next tick. Pushes can overlap if the collector is slower than the
    /// interval; they share nothing mutable.
    pub fn spawn(mut self) -> ExporterHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("exporter stopped");
                        break;
                    }
                    _ = interval.tick() => {}
                }

                let batch = self.next_batch();
                let span = batch.span().clone();
                let collector = self.collector.clone();
                tokio::spawn(async move { collector.deliver(batch).await }.instrument(span));
            }
        });

        ExporterHandle { cancel, task }
    }
}

/// Turn a snapshot plus host readings into the metric list for one batch.
pub fn encode_snapshot(
    encoder: &Encoder,
    snapshot: &Snapshot,
    cpu: f64,
    memory: f64,
) -> Vec<Metric> {
    let mut metrics = Vec::with_capacity(snapshot.requests.len() + 11);

    for (method, count) in &snapshot.requests {
        metrics.push(encoder.build(
            "requests",
            "1",
            MetricKind::Sum,
            (*count).into(),
            &[("endpoint", method.as_str())],
        ));
    }

    metrics.push(encoder.build("cpuUsage", "%", MetricKind::Gauge, cpu.into(), &[]));
    metrics.push(encoder.build("memoryUsage", "%", MetricKind::Gauge, memory.into(), &[]));

    // Can go down, so not a monotonic sum.
    metrics.push(encoder.build(
        "activeUsers",
        "1",
        MetricKind::Gauge,
        snapshot.active_users.into(),
        &[],
    ));

    let sums: [(&str, NumberValue); 5] = [
        ("pizzasSold", snapshot.pizzas_sold.into()),
        ("purchaseFailures", snapshot.purchase_failures.into()),
        ("revenue", snapshot.revenue.into()),
        ("authSuccesses", snapshot.auth_successes.into()),
        ("authFailures", snapshot.auth_failures.into()),
    ];
    for (name, value) in sums {
        metrics.push(encoder.build(name, "1", MetricKind::Sum, value, &[]));
    }

    if let Some(max) = snapshot.max_request_latency {
        metrics.push(encoder.build("reqLatency", "ms", MetricKind::Gauge, max.into(), &[]));
    }
    if let Some(max) = snapshot.max_domain_latency {
        metrics.push(encoder.build(
            "pizzaCreationLatency",
            "ms",
            MetricKind::Gauge,
            max.into(),
            &[],
        ));
    }

    metrics
}

/// Handle to a running exporter loop.
#[derive(Debug)]
pub struct ExporterHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ExporterHandle {
    /// Stop the timer and wait for the loop to exit. Pushes already in
    /// flight run to completion on their own.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            error!(%err, "exporter task ended abnormally");
        }
    }

    /// True once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
