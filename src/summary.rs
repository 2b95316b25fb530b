//! # Summary Renderer
//!
//! Renders a [`Report`] as the aligned, human-readable end-of-test summary:
//!
//! ```text
//!      checks...............: 80.00% 4 out of 5
//!      http_req_duration....: avg=150.5ms min=1ms   med=120ms max=1.2s
//!        { status:200 }.....: avg=1.5ms   min=1ms   med=1.5ms max=2ms
//!      http_reqs............: 5      0.5/s
//!      vus..................: 10     min=1      max=10
//! ```
//!
//! ## Layout
//!
//! - Metrics are listed by name; submetrics follow their parent, indented and
//!   shown by their selector only.
//! - Names are padded with dots to a common width.
//! - Trend rows print `stat=value` per configured statistic, each column
//!   padded to its widest value. Other kinds print their main value followed
//!   by dimmed extras.
//!
//! ## Humanization
//!
//! - **Rate** metrics: percentage, truncated to two decimals
//! - **Data** values: bytes with decimal (base 1000) prefixes
//! - **Time** values: milliseconds rendered as `ns`/`µs`/`ms`/`s`/`m`/`h`, or
//!   in a fixed unit when one is configured
//! - Anything else: up to six decimals without trailing zeros

use crate::metric::{MetricType, ValueType};
use crate::report::{Report, ReportMetric};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

const INDENT: &str = "   ";
const SUBMETRIC_INDENT: &str = "  ";
const BYTE_UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Fixed unit for time values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Seconds
    #[clap(name = "s")]
    Seconds,

    /// Milliseconds
    #[clap(name = "ms")]
    Millis,

    /// Microseconds
    #[clap(name = "us")]
    Micros,
}

impl TimeUnit {
    /// Multiplier from milliseconds and the printed suffix.
    fn scale(&self) -> (f64, &'static str) {
        match self {
            TimeUnit::Seconds => (0.001, "s"),
            TimeUnit::Millis => (1.0, "ms"),
            TimeUnit::Micros => (1000.0, "µs"),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Seconds => write!(f, "s"),
            TimeUnit::Millis => write!(f, "ms"),
            TimeUnit::Micros => write!(f, "us"),
        }
    }
}

/// Rendering options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Fixed time unit; `None` picks a unit per value
    pub time_unit: Option<TimeUnit>,
    /// Decorate values with ANSI colors
    pub color: bool,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            time_unit: None,
            color: true,
        }
    }
}

/// A rendered summary, one string per metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    lines: Vec<String>,
}

enum Row {
    Trend(Vec<String>),
    Plain { value: String, extras: Vec<String> },
}

impl Summary {
    pub fn from_report(report: &Report, opts: &SummaryOptions) -> Self {
        let stats = &report.trend_stats;

        let mut name_width = 0;
        let mut value_width = 0;
        let mut extra_widths: Vec<usize> = Vec::new();
        let mut trend_widths = vec![0; stats.len()];
        let mut rows: BTreeMap<&str, Row> = BTreeMap::new();

        for (name, metric) in &report.metrics {
            name_width = name_width.max(width(indent_for(name)) + width(&display_name(name)));

            if metric.meta.metric_type == MetricType::Trend {
                let cols: Vec<String> = stats
                    .iter()
                    .map(|stat| {
                        let value = metric.values.get(stat).copied().unwrap_or_default();
                        if stat == "count" {
                            value.to_string()
                        } else {
                            humanize_value(value, metric, opts.time_unit)
                        }
                    })
                    .collect();
                for (max, col) in trend_widths.iter_mut().zip(&cols) {
                    *max = (*max).max(width(col));
                }
                rows.insert(name, Row::Trend(cols));
                continue;
            }

            let mut values = plain_values(metric, opts.time_unit);
            let value = values.remove(0);
            value_width = value_width.max(width(&value));
            if extra_widths.len() < values.len() {
                extra_widths.resize(values.len(), 0);
            }
            for (max, extra) in extra_widths.iter_mut().zip(&values) {
                *max = (*max).max(width(extra));
            }
            rows.insert(
                name,
                Row::Plain {
                    value,
                    extras: values,
                },
            );
        }

        let paint = |text: &str| -> String {
            if opts.color {
                text.cyan().to_string()
            } else {
                text.to_string()
            }
        };
        let faint = |text: &str, cyan: bool| -> String {
            match (opts.color, cyan) {
                (false, _) => text.to_string(),
                (true, true) => text.cyan().dimmed().to_string(),
                (true, false) => text.dimmed().to_string(),
            }
        };

        let lines = rows
            .into_iter()
            .map(|(name, row)| {
                let data = match row {
                    Row::Trend(cols) => cols
                        .iter()
                        .zip(stats)
                        .zip(&trend_widths)
                        .map(|((col, stat), max)| {
                            format!("{}={}{}", stat, paint(col), pad(max - width(col)))
                        })
                        .collect::<Vec<_>>()
                        .join(" "),
                    Row::Plain { value, extras } => {
                        let mut data = format!("{}{}", paint(&value), pad(value_width - width(&value)));
                        match extras.len() {
                            0 => {}
                            1 => {
                                data.push(' ');
                                data.push_str(&faint(&extras[0], true));
                            }
                            _ => {
                                let parts: Vec<String> = extras
                                    .iter()
                                    .zip(&extra_widths)
                                    .map(|(extra, max)| {
                                        format!("{}{}", faint(extra, true), pad(max - width(extra)))
                                    })
                                    .collect();
                                data.push(' ');
                                data.push_str(&parts.join(" "));
                            }
                        }
                        data
                    }
                };

                let indent = indent_for(name);
                let display = display_name(name);
                let dots = ".".repeat(name_width + 3 - width(&display) - width(indent));
                // the mark column stays blank: there are no thresholds to flag
                let mark = " ";
                format!(
                    "{}{}{} {}{} {}",
                    INDENT,
                    indent,
                    mark,
                    display,
                    faint(&format!("{}:", dots), false),
                    data
                )
            })
            .collect();

        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for line in &self.lines {
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

fn pad(n: usize) -> String {
    " ".repeat(n)
}

/// Display width in characters.
fn width(s: &str) -> usize {
    s.chars().count()
}

fn indent_for(name: &str) -> &'static str {
    if name.contains('{') {
        SUBMETRIC_INDENT
    } else {
        ""
    }
}

/// `parent{k:v}` is displayed as `{ k:v }`.
fn display_name(name: &str) -> String {
    match name.find('{') {
        Some(pos) => {
            let selector = &name[pos + 1..];
            format!("{{ {} }}", selector.strip_suffix('}').unwrap_or(selector))
        }
        None => name.to_string(),
    }
}

/// Main value followed by extras for non-trend metrics.
fn plain_values(metric: &ReportMetric, time_unit: Option<TimeUnit>) -> Vec<String> {
    let get = |stat: &str| metric.values.get(stat).copied().unwrap_or_default();
    let human = |stat: &str| humanize_value(get(stat), metric, time_unit);

    match metric.meta.metric_type {
        MetricType::Counter => vec![human("count"), format!("{}/s", human("rate"))],
        MetricType::Gauge => vec![
            human("value"),
            format!("min={}", human("min")),
            format!("max={}", human("max")),
        ],
        MetricType::Rate => {
            let passes = get("passes");
            let total = passes + get("fails");
            vec![human("rate"), format!("{:.0} out of {:.0}", passes, total)]
        }
        MetricType::Trend => vec!["[no data]".to_string()],
    }
}

pub fn humanize_value(value: f64, metric: &ReportMetric, time_unit: Option<TimeUnit>) -> String {
    if metric.meta.metric_type == MetricType::Rate {
        let truncated = (value * 100.0 * 100.0).trunc() / 100.0;
        return format!("{:.2}%", truncated);
    }

    match metric.meta.contains {
        ValueType::Data => humanize_bytes(value),
        ValueType::Time => humanize_duration(value, time_unit),
        ValueType::Default => to_fixed_trimmed(value, 6),
    }
}

pub fn humanize_bytes(bytes: f64) -> String {
    if bytes < 10.0 {
        return format!("{:.0} B", bytes);
    }

    let base: f64 = 1000.0;
    let exp = (bytes.ln() / base.ln()).floor().min((BYTE_UNITS.len() - 1) as f64);
    let value = ((bytes / base.powf(exp)) * 10.0 + 0.5).floor() / 10.0;
    let unit = BYTE_UNITS[exp as usize];

    if value < 10.0 {
        format!("{:.1} {}", value, unit)
    } else {
        format!("{:.0} {}", value, unit)
    }
}

/// Humanize a duration given in milliseconds.
pub fn humanize_duration(millis: f64, time_unit: Option<TimeUnit>) -> String {
    match time_unit {
        Some(unit) => {
            let (coef, suffix) = unit.scale();
            format!("{:.2} {}", millis * coef, suffix)
        }
        None => humanize_generic_duration(millis),
    }
}

fn humanize_generic_duration(millis: f64) -> String {
    if millis == 0.0 {
        return "0s".to_string();
    }
    if millis < 0.001 {
        return format!("{}ns", (millis * 1_000_000.0) as i64);
    }
    if millis < 1.0 {
        return format!("{}µs", to_fixed_truncated(millis * 1000.0, 2));
    }
    if millis < 1000.0 {
        return format!("{}ms", to_fixed_truncated(millis, 2));
    }

    let seconds = format!("{}s", to_fixed_truncated((millis % 60_000.0) / 1000.0, 2));
    let minutes = (millis / 60_000.0).trunc();
    if minutes < 1.0 {
        return seconds;
    }

    let with_minutes = format!("{}m{}", (minutes as i64) % 60, seconds);
    let hours = (minutes / 60.0).trunc();
    if hours < 1.0 {
        return with_minutes;
    }
    format!("{}h{}", hours as i64, with_minutes)
}

/// Fixed precision with trailing zeros (and a trailing dot) removed.
fn to_fixed_trimmed(value: f64, precision: usize) -> String {
    let s = format!("{:.*}", precision, value);
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn to_fixed_truncated(value: f64, precision: usize) -> String {
    let mult = 10f64.powi(precision as i32);
    to_fixed_trimmed((value * mult).trunc() / mult, precision)
}
