//! Wire types for the collector push and the [`Encoder`] that builds them.
//!
//! The JSON shape is a trimmed OTLP/HTTP metrics body:
//!
//! ```json
//! { "resourceMetrics": [ { "scopeMetrics": [ { "metrics": [
//!   { "name": "pizzasSold", "unit": "1",
//!     "sum": { "dataPoints": [ { "asInt": 2, "timeUnixNano": 1700000000000000000,
//!                               "attributes": [ { "key": "source", "value": { "stringValue": "jwt-pizza" } } ] } ],
//!              "aggregationTemporality": "AGGREGATION_TEMPORALITY_CUMULATIVE",
//!              "isMonotonic": true } }
//! ] } ] } ] }
//! ```

use chrono::Utc;
use serde::Serialize;

/// Attribute key that identifies this deployment on every data point.
pub const SOURCE_ATTRIBUTE: &str = "source";

/// Which kind of metric to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Cumulative, monotonic sum.
    Sum,
    /// Point-in-time value.
    Gauge,
}

/// A data point's value, tagged with its numeric representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NumberValue {
    /// Encoded as `asInt`.
    AsInt(i64),
    /// Encoded as `asDouble`.
    AsDouble(f64),
}

impl From<i64> for NumberValue {
    fn from(value: i64) -> Self {
        Self::AsInt(value)
    }
}

impl From<u64> for NumberValue {
    fn from(value: u64) -> Self {
        Self::AsInt(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for NumberValue {
    fn from(value: f64) -> Self {
        Self::AsDouble(value)
    }
}

/// Top-level request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload<'a> {
    /// Always exactly one entry.
    pub resource_metrics: Vec<ResourceMetrics<'a>>,
}

impl<'a> MetricsPayload<'a> {
    /// Wrap `metrics` in one resource and one scope.
    pub fn new(metrics: &'a [Metric]) -> Self {
        Self {
            resource_metrics: vec![ResourceMetrics {
                scope_metrics: vec![ScopeMetrics { metrics }],
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics<'a> {
    pub scope_metrics: Vec<ScopeMetrics<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ScopeMetrics<'a> {
    pub metrics: &'a [Metric],
}

/// One named measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    /// Metric name.
    pub name: String,
    /// Unit string, e.g. `1`, `%` or `ms`.
    pub unit: String,
    /// Serialized as either a `sum` or a `gauge` key.
    #[serde(flatten)]
    pub data: MetricData,
}

impl Metric {
    /// The single data point this encoder ever produces.
    pub fn data_point(&self) -> Option<&DataPoint> {
        match &self.data {
            MetricData::Sum(sum) => sum.data_points.first(),
            MetricData::Gauge(gauge) => gauge.data_points.first(),
        }
    }

    /// The kind this metric was encoded as.
    pub fn kind(&self) -> MetricKind {
        match self.data {
            MetricData::Sum(_) => MetricKind::Sum,
            MetricData::Gauge(_) => MetricKind::Gauge,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricData {
    Sum(Sum),
    Gauge(Gauge),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    pub data_points: Vec<DataPoint>,
    pub aggregation_temporality: AggregationTemporality,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauge {
    pub data_points: Vec<DataPoint>,
}

/// Only cumulative sums are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregationTemporality {
    #[serde(rename = "AGGREGATION_TEMPORALITY_CUMULATIVE")]
    Cumulative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(flatten)]
    pub value: NumberValue,
    pub time_unix_nano: u64,
    pub attributes: Vec<KeyValue>,
}

impl DataPoint {
    /// Value of the attribute named `key`, if present.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.string_value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: String,
}

/// Builds [`Metric`]s stamped with this deployment's source label.
#[derive(Debug, Clone)]
pub struct Encoder {
    source: String,
}

impl Encoder {
    /// Create an encoder that tags every data point with `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// The configured source label.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Encode one measurement with a single data point timestamped now.
    ///
    /// Caller attributes keep their order and `source` is appended last. A
    /// caller attribute named `source` is dropped, the configured one always
    /// wins. Sums are always cumulative and monotonic; anything that can go
    /// down must be encoded as a gauge.
    pub fn build(
        &self,
        name: &str,
        unit: &str,
        kind: MetricKind,
        value: NumberValue,
        attributes: &[(&str, &str)],
    ) -> Metric {
        let attributes = attributes
            .iter()
            .filter(|(key, _)| *key != SOURCE_ATTRIBUTE)
            .map(|(key, value)| key_value(key, value))
            .chain(std::iter::once(key_value(SOURCE_ATTRIBUTE, &self.source)))
            .collect();

        let data_points = vec![DataPoint {
            value,
            time_unix_nano: now_unix_nano(),
            attributes,
        }];

        let data = match kind {
            MetricKind::Sum => MetricData::Sum(Sum {
                data_points,
                aggregation_temporality: AggregationTemporality::Cumulative,
                is_monotonic: true,
            }),
            MetricKind::Gauge => MetricData::Gauge(Gauge { data_points }),
        };

        Metric {
            name: name.to_owned(),
            unit: unit.to_owned(),
            data,
        }
    }
}

fn key_value(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_owned(),
        value: AnyValue {
            string_value: value.to_owned(),
        },
    }
}

fn now_unix_nano() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}
