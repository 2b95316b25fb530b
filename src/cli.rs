use crate::summary::TimeUnit;
use crate::trend::TrendBackendKind;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// loadsum - aggregate load-test samples into an end-of-test summary
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// JSON-lines sample file (reads stdin when omitted)
    #[clap(short = 'i', long, help_heading = "Core Options")]
    pub input: Option<PathBuf>,

    /// Output file for the JSON report
    #[clap(short = 'o', long, help_heading = "Core Options")]
    pub output_file: Option<PathBuf>,

    /// How often buffered samples are aggregated (e.g. 1s, 500ms)
    #[clap(long, value_parser = parse_duration, default_value = "1s", help_heading = "Core Options")]
    pub flush_interval: Duration,

    /// Tag labels kept in series keys (repeatable)
    #[clap(long = "tag", default_values_t = default_labels(), help_heading = "Core Options")]
    pub tags: Vec<String>,

    /// Percentile engine for trend metrics
    #[clap(long, value_enum, default_value_t = TrendBackendKind::Exact, env = "LOADSUM_TREND_BACKEND", help_heading = "Trend Options")]
    pub trend_backend: TrendBackendKind,

    /// Trend statistics to report, in order (avg, min, med, max, count, p(N))
    #[clap(long, value_delimiter = ',', default_values_t = default_trend_stats(), env = "LOADSUM_TREND_STATS", help_heading = "Trend Options")]
    pub trend_stats: Vec<String>,

    /// Significant digits of the HDR histogram backend
    #[clap(long, default_value_t = crate::defaults::HDR_SIGNIFICANT_DIGITS, help_heading = "Trend Options")]
    pub hdr_sigfig: u8,

    /// Highest value the HDR histogram backend accepts
    #[clap(long, default_value_t = crate::defaults::HDR_HIGHEST_VALUE, help_heading = "Trend Options")]
    pub hdr_max: u64,

    /// Relative accuracy of the DDSketch backend
    #[clap(long, default_value_t = crate::defaults::DDS_RELATIVE_ACCURACY, help_heading = "Trend Options")]
    pub dds_accuracy: f64,

    /// Bin budget of the DDSketch backend
    #[clap(long, default_value_t = crate::defaults::DDS_MAX_BINS, help_heading = "Trend Options")]
    pub dds_max_bins: u32,

    /// Submetric definitions such as 'http_req_duration{status:200}' (repeatable)
    #[clap(long = "submetric", help_heading = "Report Options")]
    pub submetrics: Vec<String>,

    /// Only report these metrics (repeatable)
    #[clap(long = "include-metric", help_heading = "Report Options")]
    pub include_metrics: Vec<String>,

    /// Never report these metrics (repeatable)
    #[clap(long = "exclude-metric", help_heading = "Report Options")]
    pub exclude_metrics: Vec<String>,

    /// Only report metrics whose name matches this regular expression
    #[clap(long, help_heading = "Report Options")]
    pub metric_regex: Option<String>,

    /// Fixed unit for time values in the summary
    #[clap(long, value_enum, help_heading = "Report Options")]
    pub time_unit: Option<TimeUnit>,

    /// Disable ANSI colors in the summary
    #[clap(long, default_value_t = false)]
    pub no_color: bool,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

fn default_labels() -> Vec<String> {
    crate::defaults::RETAINED_LABELS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_trend_stats() -> Vec<String> {
    crate::defaults::TREND_STATS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Parse duration from string (e.g., "500ms", "10s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let secs = match unit {
        "ms" => num / 1000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3600.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Duration::try_from_secs_f64(secs).map_err(|e| format!("Duration out of range: {}: {}", s, e))
}
