//! Validated run configuration.
//!
//! [`SummaryConfig::from_args`] is the single place where user input is
//! checked. Trend statistic names, submetric selectors, the metric name
//! pattern and backend parameters are all resolved here, before the first
//! sample is read.

use crate::cli::Args;
use crate::defaults;
use crate::error::ConfigError;
use crate::filter::MetricFilter;
use crate::metric::Submetric;
use crate::report::TrendStats;
use crate::summary::SummaryOptions;
use crate::trend::{HistogramSettings, SketchSettings, TrendFactory};
use std::time::Duration;
use tracing::debug;

/// Everything the output lifecycle needs to aggregate and report a run.
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub trend_factory: TrendFactory,
    pub trend_stats: TrendStats,
    /// Tag labels kept in series keys
    pub retained_labels: Vec<String>,
    pub submetrics: Vec<Submetric>,
    pub filter: MetricFilter,
    pub flush_interval: Duration,
    pub summary: SummaryOptions,
}

impl SummaryConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let trend_stats = TrendStats::parse(&args.trend_stats)?;

        let histogram = HistogramSettings {
            high: args.hdr_max,
            sigfig: args.hdr_sigfig,
            ..HistogramSettings::default()
        };
        let sketch = SketchSettings {
            relative_accuracy: args.dds_accuracy,
            max_bins: args.dds_max_bins,
        };
        let trend_factory = TrendFactory::new(args.trend_backend, histogram, sketch)?;

        let mut retained_labels = Vec::with_capacity(args.tags.len());
        for label in &args.tags {
            let label = label.trim();
            if label.is_empty() {
                return Err(ConfigError::EmptyLabel);
            }
            if !retained_labels.iter().any(|l| l == label) {
                retained_labels.push(label.to_string());
            }
        }

        let submetrics = args
            .submetrics
            .iter()
            .map(String::as_str)
            .map(Submetric::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let filter = MetricFilter::new(
            args.include_metrics.clone(),
            args.exclude_metrics.clone(),
            args.metric_regex.as_deref(),
        )?;

        if args.flush_interval.is_zero() {
            return Err(ConfigError::FlushInterval);
        }

        let config = Self {
            trend_factory,
            trend_stats,
            retained_labels,
            submetrics,
            filter,
            flush_interval: args.flush_interval,
            summary: SummaryOptions {
                time_unit: args.time_unit,
                color: !args.no_color,
            },
        };
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }

    pub fn summary_options(&self) -> &SummaryOptions {
        &self.summary
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            trend_factory: TrendFactory::default(),
            trend_stats: TrendStats::default(),
            retained_labels: defaults::RETAINED_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            submetrics: Vec::new(),
            filter: MetricFilter::default(),
            flush_interval: defaults::FLUSH_INTERVAL,
            summary: SummaryOptions::default(),
        }
    }
}
