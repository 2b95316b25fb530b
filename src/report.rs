//! # Report Builder
//!
//! Turns the accumulated series of a run into an immutable [`Report`]: one
//! entry per metric name with its statistics at that point in time.
//!
//! ## Trend Statistics
//!
//! Which statistics a trend reports is configured once as an ordered list of
//! names and resolved up front, so a typo fails at startup instead of after
//! the run:
//!
//! | name     | statistic                       |
//! |----------|---------------------------------|
//! | `avg`    | arithmetic mean                 |
//! | `min`    | smallest value                  |
//! | `med`    | `p(50)`                         |
//! | `max`    | largest value                   |
//! | `count`  | number of values                |
//! | `p(N)`   | N-th percentile, `0 <= N <= 100` |
//!
//! Counters always report `count` and `rate`, gauges `value`, `min` and
//! `max`, rates `rate`, `passes` and `fails`.

use crate::error::{ConfigError, ReportError};
use crate::filter::MetricFilter;
use crate::metric::Meta;
use crate::series::{Collection, Key};
use crate::sink::Sink;
use crate::trend::{TrendBackend, TrendEstimator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// A resolved trend statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendStat {
    Avg,
    Min,
    Med,
    Max,
    Count,
    /// Percentile as a fraction in `[0, 1]`
    Percentile(f64),
}

impl TrendStat {
    pub fn parse(stat: &str) -> Result<Self, ConfigError> {
        match stat {
            "avg" => Ok(TrendStat::Avg),
            "min" => Ok(TrendStat::Min),
            "med" => Ok(TrendStat::Med),
            "max" => Ok(TrendStat::Max),
            "count" => Ok(TrendStat::Count),
            _ if stat.starts_with("p(") => parse_percentile(stat).map(TrendStat::Percentile),
            _ => Err(ConfigError::UnknownTrendStat {
                stat: stat.to_string(),
            }),
        }
    }

    pub fn resolve(&self, trend: &mut TrendBackend) -> f64 {
        match self {
            TrendStat::Avg => trend.avg(),
            TrendStat::Min => trend.min(),
            TrendStat::Med => trend.p(0.5),
            TrendStat::Max => trend.max(),
            TrendStat::Count => trend.count() as f64,
            TrendStat::Percentile(pct) => trend.p(*pct),
        }
    }
}

/// Parse `p(N)` into the fraction `N / 100`.
pub fn parse_percentile(stat: &str) -> Result<f64, ConfigError> {
    let invalid = || ConfigError::InvalidPercentile {
        stat: stat.to_string(),
    };

    let number = stat
        .strip_prefix("p(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(invalid)?;
    let pct: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !(0.0..=100.0).contains(&pct) {
        return Err(invalid());
    }
    Ok(pct / 100.0)
}

/// Ordered list of trend statistics to report.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendStats {
    names: Vec<String>,
    stats: Vec<TrendStat>,
}

impl TrendStats {
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let mut parsed = Self {
            names: Vec::with_capacity(names.len()),
            stats: Vec::with_capacity(names.len()),
        };
        for name in names {
            let name = name.as_ref().trim();
            parsed.stats.push(TrendStat::parse(name)?);
            parsed.names.push(name.to_string());
        }
        Ok(parsed)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TrendStat)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.stats.iter().copied())
    }
}

impl Default for TrendStats {
    fn default() -> Self {
        let names: Vec<String> = crate::defaults::TREND_STATS
            .iter()
            .map(|s| s.to_string())
            .collect();
        let stats = vec![
            TrendStat::Avg,
            TrendStat::Min,
            TrendStat::Med,
            TrendStat::Max,
            TrendStat::Percentile(0.90),
            TrendStat::Percentile(0.95),
        ];
        Self { names, stats }
    }
}

/// Statistics of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetric {
    #[serde(flatten)]
    pub meta: Meta,
    pub values: BTreeMap<String, f64>,
}

/// Point-in-time summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub metrics: BTreeMap<String, ReportMetric>,
    /// Trend statistic names in configured order
    pub trend_stats: Vec<String>,
    pub elapsed: Duration,
    pub dropped_samples: u64,
}

impl Report {
    pub fn get(&self, name: &str) -> Option<&ReportMetric> {
        self.metrics.get(name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Builds [`Report`]s from a [`Collection`].
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    stats: TrendStats,
    filter: MetricFilter,
}

impl ReportBuilder {
    pub fn new(stats: TrendStats) -> Self {
        Self {
            stats,
            filter: MetricFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: MetricFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn trend_stats(&self) -> &TrendStats {
        &self.stats
    }

    /// Snapshot every metric of `collection`.
    ///
    /// Any merge failure aborts the whole report; `dropped_samples` is left
    /// at zero for the caller to fill in.
    pub fn build(&self, collection: &Collection, elapsed: Duration) -> Result<Report, ReportError> {
        let mut metrics = BTreeMap::new();

        for name in collection.metric_names() {
            if !self.filter.allows(name) {
                debug!("Metric {} filtered out of the report", name);
                continue;
            }

            let rolled = collection
                .rollup(&Key::for_metric(name))
                .map_err(|source| ReportError::Rollup {
                    metric: name.to_string(),
                    source,
                })?;
            let Some(mut series) = rolled else {
                continue;
            };

            let values = match &mut series.sink {
                Sink::Trend(trend) => self
                    .stats
                    .iter()
                    .map(|(stat_name, stat)| (stat_name.to_string(), stat.resolve(&mut trend.backend)))
                    .collect(),
                sink => sink.format(elapsed),
            };

            metrics.insert(
                name.to_string(),
                ReportMetric {
                    meta: series.meta,
                    values,
                },
            );
        }

        Ok(Report {
            metrics,
            trend_stats: self.stats.names().to_vec(),
            elapsed,
            dropped_samples: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Metric, MetricType, Sample, TagSet, ValueType};
    use crate::trend::TrendFactory;
    use chrono::Utc;
    use std::sync::Arc;

    fn collection() -> Collection {
        Collection::new(
            TrendFactory::exact(),
            vec!["group".to_string(), "scenario".to_string()],
        )
    }

    fn add(c: &mut Collection, metric: &Arc<Metric>, group: &str, value: f64) {
        let sample = Sample::new(
            Arc::clone(metric),
            TagSet::new().with("group", group),
            value,
            Utc::now(),
        );
        c.add_sample(&sample).unwrap();
    }

    #[test]
    fn test_parse_percentile() {
        assert_eq!(parse_percentile("p(95)").unwrap(), 0.95);
        assert_eq!(parse_percentile("p(0)").unwrap(), 0.0);
        assert_eq!(parse_percentile("p(100)").unwrap(), 1.0);
        assert!((parse_percentile("p(99.9)").unwrap() - 0.999).abs() < 1e-12);
        for bad in ["p(150)", "p(abc)", "p(-1)", "p()", "p(NaN)", "p(90", "95"] {
            assert!(parse_percentile(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_trend_stat_parse() {
        assert_eq!(TrendStat::parse("med").unwrap(), TrendStat::Med);
        assert_eq!(TrendStat::parse("count").unwrap(), TrendStat::Count);
        assert_eq!(TrendStat::parse("p(90)").unwrap(), TrendStat::Percentile(0.9));
        assert!(matches!(
            TrendStat::parse("mode"),
            Err(ConfigError::UnknownTrendStat { .. })
        ));
        assert!(matches!(
            TrendStat::parse("p(150)"),
            Err(ConfigError::InvalidPercentile { .. })
        ));
    }

    #[test]
    fn test_default_trend_stats_match_names() {
        let defaults = TrendStats::default();
        let parsed = TrendStats::parse(defaults.names()).unwrap();
        assert_eq!(defaults, parsed);
        assert_eq!(
            defaults.names(),
            &["avg", "min", "med", "max", "p(90)", "p(95)"]
        );
    }

    #[test]
    fn test_trend_stats_keep_configured_order() {
        let stats = TrendStats::parse(&["p(99)", "count", " max "]).unwrap();
        assert_eq!(stats.names(), &["p(99)", "count", "max"]);
        assert!(TrendStats::parse(&["avg", "bogus"]).is_err());
    }

    #[test]
    fn test_build_folds_tag_variants_per_metric() {
        let mut c = collection();
        let duration = Arc::new(Metric::new("req_duration", MetricType::Trend, ValueType::Time));
        let reqs = Arc::new(Metric::new("reqs", MetricType::Counter, ValueType::Default));
        let checks = Arc::new(Metric::new("checks", MetricType::Rate, ValueType::Default));
        let vus = Arc::new(Metric::new("vus", MetricType::Gauge, ValueType::Default));

        for (i, v) in [1.0, 2.0, 3.0, 4.0, 5.0].into_iter().enumerate() {
            let group = if i % 2 == 0 { "a" } else { "b" };
            add(&mut c, &duration, group, v);
            add(&mut c, &reqs, group, 1.0);
            add(&mut c, &checks, group, if i < 4 { 1.0 } else { 0.0 });
        }
        add(&mut c, &vus, "a", 10.0);

        let stats = TrendStats::parse(&["min", "med", "max", "count"]).unwrap();
        let report = ReportBuilder::new(stats)
            .build(&c, Duration::from_secs(5))
            .unwrap();

        assert_eq!(report.len(), 4);
        let trend = &report.get("req_duration").unwrap().values;
        assert_eq!(trend.len(), 4);
        assert_eq!(trend["min"], 1.0);
        assert_eq!(trend["med"], 3.0);
        assert_eq!(trend["max"], 5.0);
        assert_eq!(trend["count"], 5.0);

        let counter = &report.get("reqs").unwrap().values;
        assert_eq!(counter["count"], 5.0);
        assert_eq!(counter["rate"], 1.0);

        let rate = &report.get("checks").unwrap().values;
        assert_eq!(rate["rate"], 0.8);
        assert_eq!(rate["passes"], 4.0);
        assert_eq!(rate["fails"], 1.0);

        assert_eq!(report.get("vus").unwrap().values["value"], 10.0);
        assert_eq!(report.trend_stats, vec!["min", "med", "max", "count"]);
        assert_eq!(
            report.get("req_duration").unwrap().meta,
            Meta::new(MetricType::Trend, ValueType::Time)
        );
    }

    #[test]
    fn test_build_applies_filter() {
        let mut c = collection();
        let reqs = Arc::new(Metric::new("reqs", MetricType::Counter, ValueType::Default));
        let iters = Arc::new(Metric::new("iterations", MetricType::Counter, ValueType::Default));
        add(&mut c, &reqs, "a", 1.0);
        add(&mut c, &iters, "a", 1.0);

        let filter = MetricFilter::new(vec![], vec!["iterations".to_string()], None).unwrap();
        let report = ReportBuilder::default()
            .with_filter(filter)
            .build(&c, Duration::ZERO)
            .unwrap();
        assert!(report.get("reqs").is_some());
        assert!(report.get("iterations").is_none());
    }

    #[test]
    fn test_empty_collection() {
        let report = ReportBuilder::default()
            .build(&collection(), Duration::from_secs(1))
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(report.dropped_samples, 0);
    }

    #[test]
    fn test_report_serializes_meta_inline() {
        let mut c = collection();
        let reqs = Arc::new(Metric::new("reqs", MetricType::Counter, ValueType::Default));
        add(&mut c, &reqs, "a", 3.0);
        let report = ReportBuilder::default().build(&c, Duration::ZERO).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["metrics"]["reqs"]["type"], "counter");
        assert_eq!(json["metrics"]["reqs"]["contains"], "default");
        assert_eq!(json["metrics"]["reqs"]["values"]["count"], 3.0);

        let back: Report = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
