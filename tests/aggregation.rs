use anyhow::Result;
use chrono::{TimeZone, Utc};
use loadsum::trend::{HistogramSettings, SketchSettings};
use loadsum::{
    Collection, Key, Metric, MetricFilter, MetricType, ReportBuilder, Sample, Sink, Submetric,
    TagSet, TrendBackendKind, TrendEstimator, TrendFactory, TrendStats, ValueType,
};
use std::sync::Arc;
use std::time::Duration;

fn factory(kind: TrendBackendKind) -> TrendFactory {
    TrendFactory::new(kind, HistogramSettings::default(), SketchSettings::default())
        .expect("default backend settings are valid")
}

fn labels() -> Vec<String> {
    vec!["group".to_string(), "status".to_string()]
}

fn duration_metric() -> Arc<Metric> {
    let sub = Submetric::parse("http_req_duration{status:200}").unwrap();
    Arc::new(Metric::new("http_req_duration", MetricType::Trend, ValueType::Time).with_submetric(sub))
}

/// Feed 1..=100 ms split across two statuses and two groups.
fn populate(collection: &mut Collection) -> Result<()> {
    let metric = duration_metric();
    let time = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    for i in 1..=100u32 {
        let status = if i % 4 == 0 { "500" } else { "200" };
        let group = if i <= 50 { "::login" } else { "::browse" };
        let tags = TagSet::new()
            .with("status", status)
            .with("group", group)
            .with("url", format!("https://example.com/{}", i));
        collection.add_sample(&Sample::new(Arc::clone(&metric), tags, f64::from(i), time))?;
    }
    Ok(())
}

/// Every backend must agree with the exact values within its error bound.
#[test]
fn report_is_consistent_across_backends() -> Result<()> {
    let stats = TrendStats::parse(&["count", "min", "max", "avg", "med", "p(95)"])?;

    for kind in [
        TrendBackendKind::Exact,
        TrendBackendKind::Histogram,
        TrendBackendKind::Sketch,
    ] {
        let mut collection = Collection::new(factory(kind), labels());
        populate(&mut collection)?;

        // the url tag is dropped, so only status x group remain
        assert_eq!(collection.len(), 4 + 2, "{} series for {}", collection.len(), kind);

        let report = ReportBuilder::new(stats.clone()).build(&collection, Duration::from_secs(10))?;
        let parent = report.get("http_req_duration").unwrap();
        assert_eq!(parent.values["count"], 100.0);
        assert_eq!(parent.values["min"], 1.0);
        assert_eq!(parent.values["max"], 100.0);
        assert!((parent.values["avg"] - 50.5).abs() < 1e-9, "{}", kind);
        assert!((parent.values["med"] - 50.5).abs() <= 1.5, "{}: med {}", kind, parent.values["med"]);
        assert!((parent.values["p(95)"] - 95.0).abs() <= 2.0, "{}: p(95) {}", kind, parent.values["p(95)"]);

        let ok = report.get("http_req_duration{status:200}").unwrap();
        assert_eq!(ok.values["count"], 75.0);
        assert_eq!(ok.values["min"], 1.0);
        assert_eq!(ok.values["max"], 99.0);
    }
    Ok(())
}

#[test]
fn rollup_by_key_prefix() -> Result<()> {
    let mut collection = Collection::new(factory(TrendBackendKind::Exact), labels());
    populate(&mut collection)?;

    let login = Key::new("http_req_duration", &TagSet::new().with("group", "::login"));
    let mut rolled = collection.rollup(&login)?.unwrap();
    assert_eq!(rolled.key, login);
    match &mut rolled.sink {
        Sink::Trend(trend) => {
            assert_eq!(trend.backend.count(), 50);
            assert_eq!(trend.backend.max(), 50.0);
        }
        other => panic!("unexpected sink {:?}", other.metric_type()),
    }

    // a label value that only shares a prefix must not match
    let partial = Key::new("http_req_duration", &TagSet::new().with("group", "::log"));
    assert!(collection.rollup(&partial)?.is_none());
    assert!(collection.rollup(&Key::for_metric("missing"))?.is_none());
    Ok(())
}

#[test]
fn filtered_report_and_mixed_kinds() -> Result<()> {
    let mut collection = Collection::new(factory(TrendBackendKind::Sketch), labels());
    populate(&mut collection)?;

    let time = Utc::now();
    let reqs = Arc::new(Metric::new("http_reqs", MetricType::Counter, ValueType::Default));
    let checks = Arc::new(Metric::new("checks", MetricType::Rate, ValueType::Default));
    let vus = Arc::new(Metric::new("vus", MetricType::Gauge, ValueType::Default));
    for i in 0..20u32 {
        collection.add_sample(&Sample::new(Arc::clone(&reqs), TagSet::new(), 1.0, time))?;
        let passed = if i % 5 == 0 { 0.0 } else { 1.0 };
        collection.add_sample(&Sample::new(Arc::clone(&checks), TagSet::new(), passed, time))?;
        collection.add_sample(&Sample::new(Arc::clone(&vus), TagSet::new(), f64::from(i), time))?;
    }

    let filter = MetricFilter::new(vec![], vec!["vus".to_string()], None)?;
    let report = ReportBuilder::new(TrendStats::default())
        .with_filter(filter)
        .build(&collection, Duration::from_secs(10))?;

    assert!(report.get("vus").is_none());
    assert_eq!(report.get("http_reqs").unwrap().values["count"], 20.0);
    assert_eq!(report.get("http_reqs").unwrap().values["rate"], 2.0);
    assert_eq!(report.get("checks").unwrap().values["rate"], 0.8);
    assert_eq!(report.get("checks").unwrap().values["fails"], 4.0);

    let trend = report.get("http_req_duration").unwrap();
    let names: Vec<&str> = trend.values.keys().map(String::as_str).collect();
    assert_eq!(names.len(), 6);
    assert_eq!(report.trend_stats, TrendStats::default().names());
    Ok(())
}
