//! # Error Types
//!
//! Typed errors raised by the aggregation engine. Library code returns these
//! enums; the binary wraps them in `anyhow::Error` with context.
//!
//! The split follows where a failure is detected:
//!
//! - [`ConfigError`]: rejected at startup, before any sample is processed
//! - [`IngestError`]: a single sample could not be recorded (recoverable)
//! - [`TrendError`]: a trend backend refused a value
//! - [`MergeError`]: two accumulators of different shapes met in a merge
//! - [`ReportError`] / [`OutputError`]: snapshot and lifecycle failures

use crate::metric::{Meta, MetricType};
use crate::trend::TrendBackendKind;
use thiserror::Error;

/// Configuration problems detected while building a `SummaryConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid trend stat '{stat}', unknown format")]
    UnknownTrendStat { stat: String },

    #[error("invalid percentile trend stat value '{stat}', provide a number between 0 and 100")]
    InvalidPercentile { stat: String },

    #[error("invalid submetric definition '{definition}': {reason}")]
    InvalidSubmetric {
        definition: String,
        reason: &'static str,
    },

    #[error("invalid metric name pattern: {source}")]
    InvalidPattern {
        #[source]
        source: regex::Error,
    },

    #[error("invalid histogram configuration: {0}")]
    Histogram(String),

    #[error("sketch relative accuracy must be within (0, 1), got {0}")]
    SketchAccuracy(f64),

    #[error("sketch bin budget must be greater than zero")]
    SketchBins,

    #[error("flush interval must be greater than zero")]
    FlushInterval,

    #[error("retained tag label must not be empty")]
    EmptyLabel,
}

/// A trend backend could not record a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrendError {
    #[error("non-finite value {0} cannot be recorded")]
    NonFinite(f64),

    #[error("value {value} is outside the histogram range [0, {max}]")]
    OutOfRange { value: f64, max: u64 },

    #[error("histogram rejected value {value}: {reason}")]
    Record { value: f64, reason: String },
}

/// Two accumulators could not be merged.
///
/// Every variant signals a broken invariant (a series' sink diverged from
/// its metadata, or backends from different factories met), so callers are
/// expected to abort the report rather than render partial numbers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("cannot merge a {other} sink into a {target} sink")]
    SinkKind {
        target: MetricType,
        other: MetricType,
    },

    #[error("cannot merge a {other} trend backend into a {target} trend backend")]
    TrendBackend {
        target: TrendBackendKind,
        other: TrendBackendKind,
    },

    #[error("incompatible histogram layouts: {0}")]
    Histogram(String),

    #[error("incompatible sketch configurations: {0}")]
    Sketch(String),
}

/// A sample was rejected during ingestion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("metric name '{0}' is empty or contains '|', '{{' or '}}'")]
    InvalidName(String),

    #[error("metric '{name}' is registered as {registered} but the sample declares {received}")]
    MetaConflict {
        name: String,
        registered: Meta,
        received: Meta,
    },

    #[error("non-finite value {value} for metric '{metric}'")]
    NonFinite { metric: String, value: f64 },

    #[error("sample for metric '{metric}' rejected: {source}")]
    Trend {
        metric: String,
        #[source]
        source: TrendError,
    },
}

/// Building a report failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReportError {
    #[error("rollup of metric '{metric}' failed: {source}")]
    Rollup {
        metric: String,
        #[source]
        source: MergeError,
    },
}

/// Output lifecycle failures.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("periodic flusher task failed: {0}")]
    Flusher(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Report(#[from] ReportError),
}
