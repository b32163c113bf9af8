//! Just the [`Batch`] struct.

use crate::{Metric, MetricsPayload, metrics::BATCHES_LIVE};
use metrics::gauge;
use std::ops::Deref;
use tracing::trace;

/// The metrics encoded during one export tick, along with the tracing span
/// of that tick.
///
/// A batch is built on the timer task and then moved into the task that
/// pushes it, so the span travels with the data: the push is instrumented
/// with [`Batch::span`], and the span closes when the batch is dropped after
/// the push settles. A batch that is never pushed still closes its span on
/// drop.
#[derive(Debug)]
pub struct Batch {
    metrics: Vec<Metric>,

    span: tracing::Span,
}

impl Deref for Batch {
    type Target = [Metric];

    fn deref(&self) -> &Self::Target {
        &self.metrics
    }
}

impl Batch {
    /// Create a new batch from the metrics built for one tick.
    pub fn new(metrics: Vec<Metric>, span: tracing::Span) -> Self {
        crate::metrics::record_batch(metrics.len());
        Self { metrics, span }
    }

    /// The request body for this batch.
    pub fn payload(&self) -> MetricsPayload<'_> {
        MetricsPayload::new(&self.metrics)
    }

    /// Get the tracing span associated with this batch.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        self.span().in_scope(|| {
            trace!(metrics = self.metrics.len(), "dropping batch");
        });
        gauge!(BATCHES_LIVE).decrement(1);
    }
}
