//! # Series Collection
//!
//! Owns every series of a run and routes samples to them.
//!
//! ## Keys
//!
//! A series is identified by a [`Key`] rendered from the metric name and the
//! retained tags, with label pairs in lexicographic order:
//!
//! ```text
//! __name__=http_req_duration|group=::login|scenario=default
//! ```
//!
//! Tags outside the retained label list are dropped before the key is built,
//! so high-cardinality tags such as URLs never multiply series. The key built
//! from the name alone ([`Key::for_metric`]) is a literal prefix of every key
//! of that metric, which is what [`Collection::rollup`] relies on.
//!
//! ## Lifecycle
//!
//! Series are created lazily on their first accepted sample and never removed.
//! A per-name index keeps rollups from scanning unrelated series.

use crate::error::{IngestError, MergeError};
use crate::metric::{Meta, Sample, TagSet};
use crate::sink::Sink;
use crate::trend::TrendFactory;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

const NAME_LABEL: &str = "__name__";
const PAIR_SEPARATOR: char = '|';

/// Canonical identity of a series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    /// Render a key from a metric name and an already reduced tag set.
    ///
    /// `\`, `|` and `=` inside labels and values are backslash-escaped, so
    /// distinct tag sets never render the same key.
    pub fn new(name: &str, tags: &TagSet) -> Self {
        let mut key = format!("{}={}", NAME_LABEL, name);
        for (label, value) in tags.iter() {
            key.push(PAIR_SEPARATOR);
            push_escaped(&mut key, label);
            key.push('=');
            push_escaped(&mut key, value);
        }
        Key(key)
    }

    /// Key of the metric as a whole, without any tag.
    pub fn for_metric(name: &str) -> Self {
        Key(format!("{}={}", NAME_LABEL, name))
    }

    /// Metric name this key belongs to.
    pub fn metric_name(&self) -> &str {
        let rest = self
            .0
            .strip_prefix(NAME_LABEL)
            .and_then(|rest| rest.strip_prefix('='))
            .unwrap_or(&self.0);
        rest.split(PAIR_SEPARATOR).next().unwrap_or(rest)
    }

    /// The tagless key of this key's metric. Always a prefix of `self`.
    pub fn metric_name_key(&self) -> Key {
        Key::for_metric(self.metric_name())
    }

    /// True when `other` equals `self` or extends it with more label pairs.
    pub fn covers(&self, other: &Key) -> bool {
        match other.0.strip_prefix(&self.0) {
            Some(rest) => rest.is_empty() || rest.starts_with(PAIR_SEPARATOR),
            None => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn push_escaped(key: &mut String, part: &str) {
    for c in part.chars() {
        if matches!(c, '\\' | PAIR_SEPARATOR | '=') {
            key.push('\\');
        }
        key.push(c);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One accumulated series.
#[derive(Debug, Clone)]
pub struct Series {
    pub key: Key,
    pub meta: Meta,
    pub sink: Sink,
}

#[derive(Debug)]
struct NameIndex {
    meta: Meta,
    keys: BTreeSet<Key>,
}

/// Every series of the run, keyed by [`Key`].
#[derive(Debug)]
pub struct Collection {
    series: HashMap<Key, Series>,
    by_name: HashMap<String, NameIndex>,
    retained_labels: Vec<String>,
    trends: TrendFactory,
}

impl Collection {
    /// Empty collection building trend sinks with `trends` and keeping only
    /// `retained_labels` in series keys.
    pub fn new(trends: TrendFactory, retained_labels: Vec<String>) -> Self {
        Self {
            series: HashMap::new(),
            by_name: HashMap::new(),
            retained_labels,
            trends,
        }
    }

    pub fn retained_labels(&self) -> &[String] {
        &self.retained_labels
    }

    pub fn trend_factory(&self) -> &TrendFactory {
        &self.trends
    }

    /// Key of `name` with `tags` reduced to the retained labels.
    pub fn key(&self, name: &str, tags: &TagSet) -> Key {
        Key::new(name, &tags.retain_labels(&self.retained_labels))
    }

    /// Record a sample under its metric and every matching submetric.
    pub fn add_sample(&mut self, sample: &Sample) -> Result<(), IngestError> {
        let metric = &sample.metric;
        if !sample.value.is_finite() {
            return Err(IngestError::NonFinite {
                metric: metric.name.clone(),
                value: sample.value,
            });
        }

        // check every target first so a sample is recorded everywhere or nowhere
        self.check_meta(&metric.name, metric.meta)?;
        for sub in metric.matching_submetrics(&sample.tags) {
            self.check_meta(&sub.name, metric.meta)?;
        }

        self.add_metric_sample(
            &metric.name,
            metric.meta,
            &sample.tags,
            sample.value,
            sample.time,
        )?;
        for sub in metric.matching_submetrics(&sample.tags) {
            self.add_metric_sample(&sub.name, metric.meta, &sample.tags, sample.value, sample.time)?;
        }
        Ok(())
    }

    fn check_meta(&self, name: &str, meta: Meta) -> Result<(), IngestError> {
        match self.by_name.get(name) {
            Some(index) if index.meta != meta => Err(IngestError::MetaConflict {
                name: name.to_string(),
                registered: index.meta,
                received: meta,
            }),
            _ => Ok(()),
        }
    }

    /// Record a value into the series of `name` and `tags`, creating the
    /// series if this is its first accepted value.
    pub fn add_metric_sample(
        &mut self,
        name: &str,
        meta: Meta,
        tags: &TagSet,
        value: f64,
        time: DateTime<Utc>,
    ) -> Result<(), IngestError> {
        self.check_meta(name, meta)?;

        let key = self.key(name, tags);
        let rejected = |source| IngestError::Trend {
            metric: name.to_string(),
            source,
        };

        if let Some(series) = self.series.get_mut(&key) {
            return series.sink.add(value, time).map_err(rejected);
        }

        let mut sink = Sink::new(meta.metric_type, &self.trends);
        sink.add(value, time).map_err(rejected)?;

        debug!("New series {} ({})", key, meta);
        self.by_name
            .entry(name.to_string())
            .or_insert_with(|| NameIndex {
                meta,
                keys: BTreeSet::new(),
            })
            .keys
            .insert(key.clone());
        self.series.insert(key.clone(), Series { key, meta, sink });
        Ok(())
    }

    /// Merge every series covered by `key` into one synthesized series.
    ///
    /// Returns `Ok(None)` when nothing matches. The stored series are left
    /// untouched.
    pub fn rollup(&self, key: &Key) -> Result<Option<Series>, MergeError> {
        let Some(index) = self.by_name.get(key.metric_name()) else {
            return Ok(None);
        };

        let mut rolled: Option<Series> = None;
        for stored in index.keys.iter().filter(|k| key.covers(k)) {
            let Some(series) = self.series.get(stored) else {
                continue;
            };
            match rolled.as_mut() {
                Some(acc) => acc.sink.merge(&series.sink)?,
                None => {
                    rolled = Some(Series {
                        key: key.clone(),
                        meta: series.meta,
                        sink: series.sink.clone(),
                    })
                }
            }
        }
        Ok(rolled)
    }

    /// Names of every metric with at least one series.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn meta(&self, name: &str) -> Option<Meta> {
        self.by_name.get(name).map(|index| index.meta)
    }

    pub fn get(&self, key: &Key) -> Option<&Series> {
        self.series.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrendError;
    use crate::metric::{Metric, MetricType, Submetric, ValueType};
    use crate::trend::{HistogramSettings, SketchSettings, TrendBackendKind};
    use std::sync::Arc;
    use std::time::Duration;

    fn labels() -> Vec<String> {
        vec!["group".to_string(), "scenario".to_string()]
    }

    fn collection() -> Collection {
        Collection::new(TrendFactory::exact(), labels())
    }

    fn sample(metric: &Arc<Metric>, tags: TagSet, value: f64) -> Sample {
        Sample::new(Arc::clone(metric), tags, value, Utc::now())
    }

    fn count(series: &mut Series) -> f64 {
        series.sink.format(Duration::ZERO)["count"]
    }

    fn counter(name: &str) -> Arc<Metric> {
        Arc::new(Metric::new(name, MetricType::Counter, ValueType::Default))
    }

    #[test]
    fn test_key_is_tag_order_independent() {
        let c = collection();
        let a = c.key("m", &TagSet::new().with("scenario", "s").with("group", "g"));
        let b = c.key("m", &TagSet::new().with("group", "g").with("scenario", "s"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "__name__=m|group=g|scenario=s");
    }

    #[test]
    fn test_key_drops_unretained_labels() {
        let c = collection();
        let key = c.key(
            "http_reqs",
            &TagSet::new().with("url", "http://example.com").with("group", "g"),
        );
        assert_eq!(key.as_str(), "__name__=http_reqs|group=g");
    }

    #[test]
    fn test_key_escapes_separators() {
        let c = collection();
        let smuggled = c.key("reqs", &TagSet::new().with("group", "a|scenario=b"));
        let plain = c.key("reqs", &TagSet::new().with("group", "a").with("scenario", "b"));
        assert_ne!(smuggled, plain);
        assert_eq!(smuggled.as_str(), r"__name__=reqs|group=a\|scenario\=b");
        assert_eq!(smuggled.metric_name(), "reqs");

        let backslash = c.key("reqs", &TagSet::new().with("group", r"a\"));
        assert_eq!(backslash.as_str(), r"__name__=reqs|group=a\\");
        assert!(!c
            .key("reqs", &TagSet::new().with("group", "a"))
            .covers(&smuggled));
    }

    #[test]
    fn test_separator_tags_stay_separate_series() {
        let mut c = collection();
        let reqs = counter("reqs");
        c.add_sample(&sample(&reqs, TagSet::new().with("group", "a|scenario=b"), 1.0))
            .unwrap();
        c.add_sample(&sample(
            &reqs,
            TagSet::new().with("group", "a").with("scenario", "b"),
            2.0,
        ))
        .unwrap();
        assert_eq!(c.len(), 2);

        let plain = c.key("reqs", &TagSet::new().with("group", "a").with("scenario", "b"));
        let mut rolled = c.rollup(&plain).unwrap().unwrap();
        assert_eq!(count(&mut rolled), 2.0);

        let mut all = c.rollup(&Key::for_metric("reqs")).unwrap().unwrap();
        assert_eq!(count(&mut all), 3.0);
    }

    #[test]
    fn test_metric_name_key_is_prefix() {
        let c = collection();
        let key = c.key("http_req_duration", &TagSet::new().with("group", "::a"));
        let name_key = key.metric_name_key();
        assert_eq!(key.metric_name(), "http_req_duration");
        assert!(key.as_str().starts_with(name_key.as_str()));
        assert!(name_key.covers(&key));
        assert_eq!(name_key, Key::for_metric("http_req_duration"));
    }

    #[test]
    fn test_covers_respects_pair_boundaries() {
        let query = Key::for_metric("http_req");
        assert!(query.covers(&Key::for_metric("http_req")));
        assert!(query.covers(&Key::new("http_req", &TagSet::new().with("group", "g"))));
        assert!(!query.covers(&Key::for_metric("http_reqs")));
    }

    #[test]
    fn test_rollup_folds_tag_variants() {
        let mut c = collection();
        let reqs = counter("http_reqs");
        for group in ["a", "b", "c"] {
            c.add_sample(&sample(&reqs, TagSet::new().with("group", group), 2.0))
                .unwrap();
        }
        c.add_sample(&sample(&counter("http_reqs_failed"), TagSet::new(), 100.0))
            .unwrap();
        assert_eq!(c.len(), 4);

        let mut rolled = c.rollup(&Key::for_metric("http_reqs")).unwrap().unwrap();
        assert_eq!(count(&mut rolled), 6.0);

        let single = c
            .rollup(&Key::new("http_reqs", &TagSet::new().with("group", "b")))
            .unwrap()
            .unwrap();
        let Sink::Counter(s) = single.sink else {
            panic!("expected counter");
        };
        assert_eq!(s.value, 2.0);

        // rollups leave the stored series untouched
        let mut again = c.rollup(&Key::for_metric("http_reqs")).unwrap().unwrap();
        assert_eq!(count(&mut again), 6.0);
    }

    #[test]
    fn test_rollup_of_unknown_metric() {
        let c = collection();
        assert!(c.rollup(&Key::for_metric("nope")).unwrap().is_none());
    }

    #[test]
    fn test_submetric_routing() {
        let sub = Submetric::parse("http_reqs{status:200}").unwrap();
        let reqs = Arc::new(
            Metric::new("http_reqs", MetricType::Counter, ValueType::Default).with_submetric(sub),
        );
        let mut c = collection();

        c.add_sample(&sample(&reqs, TagSet::new().with("status", "200"), 1.0))
            .unwrap();
        c.add_sample(&sample(&reqs, TagSet::new().with("status", "500"), 1.0))
            .unwrap();

        let mut parent = c.rollup(&Key::for_metric("http_reqs")).unwrap().unwrap();
        let mut child = c
            .rollup(&Key::for_metric("http_reqs{status:200}"))
            .unwrap()
            .unwrap();
        assert_eq!(count(&mut parent), 2.0);
        assert_eq!(count(&mut child), 1.0);
        assert_eq!(
            c.meta("http_reqs{status:200}"),
            Some(Meta::new(MetricType::Counter, ValueType::Default))
        );
    }

    #[test]
    fn test_rejected_sample_creates_no_series() {
        let factory = TrendFactory::new(
            TrendBackendKind::Histogram,
            HistogramSettings::default(),
            SketchSettings::default(),
        )
        .unwrap();
        let mut c = Collection::new(factory, labels());
        let latency = Arc::new(Metric::new("latency", MetricType::Trend, ValueType::Time));

        let err = c
            .add_sample(&sample(&latency, TagSet::new(), -1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Trend {
                source: TrendError::OutOfRange { .. },
                ..
            }
        ));
        assert!(c.is_empty());
        assert!(c.meta("latency").is_none());

        let err = c
            .add_sample(&sample(&latency, TagSet::new(), f64::INFINITY))
            .unwrap_err();
        assert!(matches!(err, IngestError::NonFinite { .. }));
        assert!(c.is_empty());
    }

    #[test]
    fn test_submetric_conflict_records_nothing() {
        let mut c = collection();
        let squatter = Arc::new(Metric::new(
            "http_reqs{status:200}",
            MetricType::Gauge,
            ValueType::Default,
        ));
        c.add_sample(&sample(&squatter, TagSet::new(), 5.0)).unwrap();

        let sub = Submetric::parse("http_reqs{status:200}").unwrap();
        let reqs = Arc::new(
            Metric::new("http_reqs", MetricType::Counter, ValueType::Default).with_submetric(sub),
        );
        let err = c
            .add_sample(&sample(&reqs, TagSet::new().with("status", "200"), 1.0))
            .unwrap_err();
        assert!(matches!(err, IngestError::MetaConflict { .. }));
        assert!(c.rollup(&Key::for_metric("http_reqs")).unwrap().is_none());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_meta_conflict_is_rejected() {
        let mut c = collection();
        c.add_sample(&sample(&counter("iterations"), TagSet::new(), 1.0))
            .unwrap();
        let gauge = Arc::new(Metric::new("iterations", MetricType::Gauge, ValueType::Default));
        let err = c.add_sample(&sample(&gauge, TagSet::new(), 1.0)).unwrap_err();
        assert!(matches!(err, IngestError::MetaConflict { .. }));
        assert_eq!(c.len(), 1);
    }
}
