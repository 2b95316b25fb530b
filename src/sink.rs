//! # Sinks
//!
//! Mergeable accumulators, one per series. The concrete kind of a sink is
//! chosen from the metric's [`MetricType`] when the series is created and
//! never changes afterwards.
//!
//! ## Merge Algebra
//!
//! Merging is how the report folds every tag combination of a metric into a
//! single summary, so each kind merges commutatively and associatively:
//!
//! - **Counter**: values add up; the earliest first-seen timestamp wins
//! - **Gauge**: min of mins, max of maxes; the value of the side with the later
//!   sample time wins, ties keep the larger value
//! - **Rate**: totals and non-zero counts add up
//! - **Trend**: delegated to the trend backend
//!
//! Merging two different kinds is a [`MergeError`].

use crate::error::{MergeError, TrendError};
use crate::metric::MetricType;
use crate::trend::{TrendBackend, TrendEstimator, TrendFactory};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Statistics produced by [`Sink::format`], keyed by statistic name.
pub type SinkValues = BTreeMap<String, f64>;

/// Running sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterSink {
    pub value: f64,
    pub first: Option<DateTime<Utc>>,
}

impl CounterSink {
    pub fn add(&mut self, value: f64, time: DateTime<Utc>) {
        self.value += value;
        self.first = Some(self.first.map_or(time, |first| first.min(time)));
    }

    pub fn merge(&mut self, other: &CounterSink) {
        self.value += other.value;
        self.first = match (self.first, other.first) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    /// Per-second rate over `elapsed`; zero when no time has passed.
    pub fn rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.value / secs
        } else {
            0.0
        }
    }
}

/// Last value with observed extremes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaugeSink {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub last: Option<DateTime<Utc>>,
}

impl GaugeSink {
    pub fn add(&mut self, value: f64, time: DateTime<Utc>) {
        match self.last {
            None => {
                self.min = value;
                self.max = value;
                self.last = Some(time);
            }
            Some(last) => {
                self.min = self.min.min(value);
                self.max = self.max.max(value);
                self.last = Some(last.max(time));
            }
        }
        self.value = value;
    }

    pub fn merge(&mut self, other: &GaugeSink) {
        let Some(other_last) = other.last else {
            return;
        };
        let Some(last) = self.last else {
            *self = other.clone();
            return;
        };

        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        if other_last > last {
            self.value = other.value;
            self.last = Some(other_last);
        } else if other_last == last {
            self.value = self.value.max(other.value);
        }
    }
}

/// Share of non-zero samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateSink {
    pub total: u64,
    pub trues: u64,
}

impl RateSink {
    pub fn add(&mut self, value: f64) {
        self.total += 1;
        if value != 0.0 {
            self.trues += 1;
        }
    }

    pub fn merge(&mut self, other: &RateSink) {
        self.total += other.total;
        self.trues += other.trues;
    }

    pub fn rate(&self) -> f64 {
        match self.total {
            0 => 0.0,
            total => self.trues as f64 / total as f64,
        }
    }

    pub fn fails(&self) -> u64 {
        self.total - self.trues
    }
}

/// Distribution of values, held by a trend backend.
#[derive(Debug, Clone)]
pub struct TrendSink {
    pub backend: TrendBackend,
}

impl TrendSink {
    pub fn new(backend: TrendBackend) -> Self {
        Self { backend }
    }
}

/// Accumulator of one series.
#[derive(Debug, Clone)]
pub enum Sink {
    Counter(CounterSink),
    Gauge(GaugeSink),
    Rate(RateSink),
    Trend(TrendSink),
}

impl Sink {
    /// Empty sink for a metric of the given kind.
    pub fn new(metric_type: MetricType, trends: &TrendFactory) -> Self {
        match metric_type {
            MetricType::Counter => Sink::Counter(CounterSink::default()),
            MetricType::Gauge => Sink::Gauge(GaugeSink::default()),
            MetricType::Rate => Sink::Rate(RateSink::default()),
            MetricType::Trend => Sink::Trend(TrendSink::new(trends.build())),
        }
    }

    pub fn metric_type(&self) -> MetricType {
        match self {
            Sink::Counter(_) => MetricType::Counter,
            Sink::Gauge(_) => MetricType::Gauge,
            Sink::Rate(_) => MetricType::Rate,
            Sink::Trend(_) => MetricType::Trend,
        }
    }

    /// Record one sample. Only trend backends can refuse a value.
    pub fn add(&mut self, value: f64, time: DateTime<Utc>) -> Result<(), TrendError> {
        match self {
            Sink::Counter(s) => s.add(value, time),
            Sink::Gauge(s) => s.add(value, time),
            Sink::Rate(s) => s.add(value),
            Sink::Trend(s) => s.backend.add(value)?,
        }
        Ok(())
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: &Sink) -> Result<(), MergeError> {
        match (self, other) {
            (Sink::Counter(a), Sink::Counter(b)) => a.merge(b),
            (Sink::Gauge(a), Sink::Gauge(b)) => a.merge(b),
            (Sink::Rate(a), Sink::Rate(b)) => a.merge(b),
            (Sink::Trend(a), Sink::Trend(b)) => a.backend.merge(&b.backend)?,
            (target, other) => {
                return Err(MergeError::SinkKind {
                    target: target.metric_type(),
                    other: other.metric_type(),
                })
            }
        }
        Ok(())
    }

    /// Statistics of the sink at this point of the run.
    ///
    /// `elapsed` is the run duration so far, used for counter rates.
    pub fn format(&mut self, elapsed: Duration) -> SinkValues {
        let pairs: Vec<(&str, f64)> = match self {
            Sink::Counter(s) => vec![("count", s.value), ("rate", s.rate(elapsed))],
            Sink::Gauge(s) => vec![("value", s.value), ("min", s.min), ("max", s.max)],
            Sink::Rate(s) => vec![
                ("rate", s.rate()),
                ("passes", s.trues as f64),
                ("fails", s.fails() as f64),
            ],
            Sink::Trend(s) => {
                let t = &mut s.backend;
                vec![
                    ("min", t.min()),
                    ("max", t.max()),
                    ("avg", t.avg()),
                    ("med", t.p(0.5)),
                    ("p(90)", t.p(0.90)),
                    ("p(95)", t.p(0.95)),
                ]
            }
        };

        pairs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}
