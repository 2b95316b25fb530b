//! # Metric Model
//!
//! Identity of the measurements flowing into the engine: metric kinds, value
//! semantics, tag sets, samples, submetrics and the registry that keeps a
//! metric name bound to a single kind for the whole run.
//!
//! ## Submetrics
//!
//! A submetric is a derived metric named `parent{label:value,...}`. Every
//! sample of the parent whose tags contain all selector pairs is recorded a
//! second time under the submetric name, so the report can show, for example,
//! `http_req_duration{status:200}` beneath `http_req_duration`.

use crate::error::{ConfigError, IngestError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// The accumulator kind a metric is aggregated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Monotonic sum, reported as total and per-second rate
    Counter,
    /// Last value wins, reported with observed min/max
    Gauge,
    /// Ratio of non-zero samples
    Rate,
    /// Distribution of values, reported with percentiles
    Trend,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::Counter => write!(f, "counter"),
            MetricType::Gauge => write!(f, "gauge"),
            MetricType::Rate => write!(f, "rate"),
            MetricType::Trend => write!(f, "trend"),
        }
    }
}

/// What a metric's values represent. Only affects formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Default,
    /// Durations in milliseconds
    Time,
    /// Sizes in bytes
    Data,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Default => write!(f, "default"),
            ValueType::Time => write!(f, "time"),
            ValueType::Data => write!(f, "data"),
        }
    }
}

/// Shape of a series: its accumulator kind and value semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub contains: ValueType,
}

impl Meta {
    pub fn new(metric_type: MetricType, contains: ValueType) -> Self {
        Self {
            metric_type,
            contains,
        }
    }
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.metric_type, self.contains)
    }
}

/// Label → value pairs attached to a sample.
///
/// Backed by a `BTreeMap`, so iteration is always in label order no matter
/// how the tags were inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(label, value);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.0.insert(label.into(), value.into());
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0.get(label).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keep only the given labels.
    pub fn retain_labels(&self, labels: &[String]) -> TagSet {
        labels
            .iter()
            .filter_map(|label| self.0.get(label).map(|v| (label.clone(), v.clone())))
            .collect()
    }

    /// True when every pair of `selector` is present in `self`.
    pub fn contains_all(&self, selector: &TagSet) -> bool {
        selector
            .iter()
            .all(|(label, value)| self.get(label) == Some(value))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TagSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A metric derived from a parent by a tag selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submetric {
    /// Canonical name: `parent{label:value,...}` with selector pairs sorted
    pub name: String,
    pub parent: String,
    pub selector: TagSet,
}

impl Submetric {
    /// Parse a definition such as `http_req_duration{status:200,method:GET}`.
    ///
    /// Whitespace around labels and values is ignored. The resulting name is
    /// canonical, so `m{b:2,a:1}` and `m{a:1, b:2}` describe the same
    /// submetric.
    pub fn parse(definition: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidSubmetric {
            definition: definition.to_string(),
            reason,
        };

        let trimmed = definition.trim();
        let open = trimmed
            .find('{')
            .ok_or_else(|| invalid("expected '{' after the parent metric name"))?;
        let body = trimmed[open + 1..]
            .strip_suffix('}')
            .ok_or_else(|| invalid("expected a closing '}'"))?;

        let parent = trimmed[..open].trim();
        if parent.is_empty() || parent.contains('|') {
            return Err(invalid("parent metric name is empty or contains '|'"));
        }

        let mut selector = TagSet::new();
        for pair in body.split(',') {
            let (label, value) = pair
                .split_once(':')
                .ok_or_else(|| invalid("selector pairs must look like label:value"))?;
            let label = label.trim();
            if label.is_empty() {
                return Err(invalid("selector label is empty"));
            }
            selector.insert(label, value.trim());
        }

        let pairs: Vec<String> = selector
            .iter()
            .map(|(label, value)| format!("{}:{}", label, value))
            .collect();

        Ok(Self {
            name: format!("{}{{{}}}", parent, pairs.join(",")),
            parent: parent.to_string(),
            selector,
        })
    }

    pub fn matches(&self, tags: &TagSet) -> bool {
        tags.contains_all(&self.selector)
    }
}

/// A registered metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub meta: Meta,
    pub submetrics: Vec<Submetric>,
}

impl Metric {
    pub fn new(name: impl Into<String>, metric_type: MetricType, contains: ValueType) -> Self {
        Self {
            name: name.into(),
            meta: Meta::new(metric_type, contains),
            submetrics: Vec::new(),
        }
    }

    pub fn with_submetric(mut self, submetric: Submetric) -> Self {
        self.submetrics.push(submetric);
        self
    }

    /// Submetrics whose selector matches the given tags.
    pub fn matching_submetrics<'a>(
        &'a self,
        tags: &'a TagSet,
    ) -> impl Iterator<Item = &'a Submetric> + 'a {
        self.submetrics.iter().filter(move |sub| sub.matches(tags))
    }
}

/// A single measurement.
#[derive(Debug, Clone)]
pub struct Sample {
    pub metric: Arc<Metric>,
    pub tags: TagSet,
    pub value: f64,
    pub time: DateTime<Utc>,
}

impl Sample {
    pub fn new(metric: Arc<Metric>, tags: TagSet, value: f64, time: DateTime<Utc>) -> Self {
        Self {
            metric,
            tags,
            value,
            time,
        }
    }
}

/// Name → metric bindings for one run.
///
/// Configured submetrics are attached to their parent when the parent is
/// first registered.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    metrics: HashMap<String, Arc<Metric>>,
    submetrics: Vec<Submetric>,
}

impl MetricRegistry {
    pub fn new(submetrics: Vec<Submetric>) -> Self {
        Self {
            metrics: HashMap::new(),
            submetrics,
        }
    }

    /// Return the metric bound to `name`, registering it on first use.
    ///
    /// Fails when the name is already bound to a different [`Meta`].
    pub fn register(&mut self, name: &str, meta: Meta) -> Result<Arc<Metric>, IngestError> {
        if let Some(existing) = self.metrics.get(name) {
            if existing.meta != meta {
                return Err(IngestError::MetaConflict {
                    name: name.to_string(),
                    registered: existing.meta,
                    received: meta,
                });
            }
            return Ok(Arc::clone(existing));
        }

        // braces are reserved for submetric names
        if name.is_empty() || name.contains(|c| matches!(c, '|' | '{' | '}')) {
            return Err(IngestError::InvalidName(name.to_string()));
        }

        let metric = Metric {
            name: name.to_string(),
            meta,
            submetrics: self
                .submetrics
                .iter()
                .filter(|sub| sub.parent == name)
                .cloned()
                .collect(),
        };
        let metric = Arc::new(metric);
        self.metrics.insert(name.to_string(), Arc::clone(&metric));
        Ok(metric)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Metric>> {
        self.metrics.get(name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// One line of a JSON-lines sample file.
///
/// ```json
/// {"metric": "http_req_duration", "type": "trend", "contains": "time",
///  "value": 12.5, "time": "2024-05-01T10:00:00Z", "tags": {"group": "::login"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub metric: String,
    #[serde(rename = "type", default = "default_metric_type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub contains: ValueType,
    pub value: f64,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: TagSet,
}

fn default_metric_type() -> MetricType {
    MetricType::Trend
}

impl SampleRecord {
    /// Resolve the record against the registry, stamping missing times with `now`.
    pub fn into_sample(
        self,
        registry: &mut MetricRegistry,
        now: DateTime<Utc>,
    ) -> Result<Sample, IngestError> {
        let metric = registry.register(&self.metric, Meta::new(self.metric_type, self.contains))?;
        Ok(Sample::new(
            metric,
            self.tags,
            self.value,
            self.time.unwrap_or(now),
        ))
    }
}
