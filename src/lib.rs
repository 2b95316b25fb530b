//! # Load Test Summary Library
//!
//! Aggregates the metric samples emitted during a load test into per-series
//! sinks and renders an end-of-test summary, both as an aligned terminal
//! report and as a JSON document.
//!
//! ## Data Model
//!
//! - **Metrics** have a name, a kind (counter, gauge, rate, trend) and a
//!   value type (default, time, data). A metric may declare **submetrics**,
//!   selected by tag filters such as `http_req_duration{status:200}`.
//! - **Samples** carry a metric, a tag set, a value and a timestamp.
//! - **Series** are keyed by the metric name plus the retained tag labels.
//!   Every series owns one sink of the metric's kind.
//!
//! ## Architecture Overview
//!
//! - `metric`: metric definitions, tag sets, submetric selectors and samples
//! - `trend`: interchangeable percentile engines (exact, HDR, DDSketch)
//! - `sink`: per-kind accumulators and their reported values
//! - `series`: series keys, the series collection and key-prefix rollup
//! - `report`: trend statistics, metric filtering and report building
//! - `summary`: aligned, humanized text rendering of a report
//! - `output`: sample buffering, periodic flushing and the run lifecycle
//! - `input`, `results`, `cli`, `config`, `logging`: the command-line front end
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use loadsum::{MetricRegistry, SampleRecord, Summary, SummaryConfig, SummaryOutput};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SummaryConfig::default();
//!     let mut output = SummaryOutput::new(&config);
//!     output.start();
//!
//!     let mut registry = MetricRegistry::default();
//!     let record: SampleRecord = serde_json::from_str(
//!         r#"{"metric":"http_req_duration","contains":"time","value":42.0}"#,
//!     )?;
//!     output.buffer().push(record.into_sample(&mut registry, Utc::now())?);
//!
//!     let report = output.stop().await?;
//!     print!("{}", Summary::from_report(&report, config.summary_options()));
//!     Ok(())
//! }
//! ```

/// Command-line interface
pub mod cli;

/// Validated run configuration built from the command line
pub mod config;

/// Typed errors for configuration, ingestion, merging and reporting
pub mod error;

/// Report filtering by metric name
pub mod filter;

/// JSON-lines sample reader
pub mod input;

/// Colored log formatting and subscriber setup
pub mod logging;

/// Metrics, tags, submetrics and samples
pub mod metric;

/// Sample buffering, periodic flushing and the run lifecycle
pub mod output;

/// Report building and trend statistic selection
pub mod report;

/// JSON report files
pub mod results;

/// Series keys, the series collection and rollup
///
/// Each distinct (metric, retained tags) combination gets its own sink.
/// Series sharing a key prefix can be folded into one on demand.
pub mod series;

/// Per-kind sample accumulators
pub mod sink;

/// Aligned, humanized text rendering of a report
pub mod summary;

/// Percentile engines for trend metrics
pub mod trend;

pub use cli::Args;
pub use config::SummaryConfig;
pub use error::{ConfigError, IngestError, MergeError, OutputError, ReportError, TrendError};
pub use filter::MetricFilter;
pub use metric::{
    Meta, Metric, MetricRegistry, MetricType, Sample, SampleRecord, Submetric, TagSet, ValueType,
};
pub use output::{Aggregator, PeriodicFlusher, SampleBuffer, SummaryOutput};
pub use report::{Report, ReportBuilder, ReportMetric, TrendStat, TrendStats};
pub use results::{ReportFile, ReportWriter};
pub use series::{Collection, Key, Series};
pub use sink::Sink;
pub use summary::{Summary, SummaryOptions, TimeUnit};
pub use trend::{TrendBackend, TrendBackendKind, TrendEstimator, TrendFactory};

/// The current version, recorded in JSON reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// How often buffered samples are aggregated
    pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

    /// Trend statistics reported when none are configured, in display order
    pub const TREND_STATS: &[&str] = &["avg", "min", "med", "max", "p(90)", "p(95)"];

    /// Tag labels kept in series keys
    ///
    /// Everything else is dropped before keying so that high-cardinality tags
    /// such as URLs do not explode the number of series.
    pub const RETAINED_LABELS: &[&str] = &["group", "scenario"];

    /// Lowest discernible value of the HDR histogram backend
    pub const HDR_LOWEST_VALUE: u64 = 1;

    /// Highest trackable value of the HDR histogram backend
    pub const HDR_HIGHEST_VALUE: u64 = 100_000_000_000;

    /// Significant value digits of the HDR histogram backend
    pub const HDR_SIGNIFICANT_DIGITS: u8 = 3;

    /// Relative accuracy of the DDSketch backend
    pub const DDS_RELATIVE_ACCURACY: f64 = 0.01;

    /// Bin budget of the DDSketch backend
    pub const DDS_MAX_BINS: u32 = 2048;
}
