//! JSON-lines sample input.
//!
//! Each non-blank line is one [`SampleRecord`]. Malformed lines and samples
//! the registry refuses are logged and counted, never fatal.

use crate::metric::{MetricRegistry, SampleRecord};
use crate::output::SampleBuffer;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Samples pushed into the buffer per lock acquisition.
const BATCH_SIZE: usize = 1024;

/// Outcome of reading one input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub lines: u64,
    pub samples: u64,
    pub rejected: u64,
}

/// Read samples from `path`, or from stdin when no path is given.
pub fn read_path(
    path: Option<&Path>,
    registry: &mut MetricRegistry,
    buffer: &SampleBuffer,
) -> Result<ReadStats> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open sample file {:?}", path))?;
            read_samples(BufReader::new(file), registry, buffer)
        }
        None => read_samples(io::stdin().lock(), registry, buffer),
    }
}

/// Parse JSON lines from `reader` and push the samples into `buffer`.
pub fn read_samples<R: BufRead>(
    reader: R,
    registry: &mut MetricRegistry,
    buffer: &SampleBuffer,
) -> Result<ReadStats> {
    let mut stats = ReadStats::default();
    let mut batch = Vec::with_capacity(BATCH_SIZE);

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read input line {}", idx + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let record: SampleRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed line {}: {}", idx + 1, e);
                stats.rejected += 1;
                continue;
            }
        };

        match record.into_sample(registry, Utc::now()) {
            Ok(sample) => {
                batch.push(sample);
                stats.samples += 1;
            }
            Err(e) => {
                warn!("Skipping line {}: {}", idx + 1, e);
                stats.rejected += 1;
            }
        }

        if batch.len() >= BATCH_SIZE {
            buffer.extend(batch.drain(..));
        }
    }
    buffer.extend(batch);

    debug!("Input finished: {:?}", stats);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{MetricType, Submetric};
    use std::io::Cursor;

    #[test]
    fn test_reads_valid_lines() {
        let input = r#"
{"metric":"http_reqs","type":"counter","value":1,"tags":{"status":"200"}}
{"metric":"http_req_duration","contains":"time","value":12.5}

{"metric":"http_reqs","type":"counter","value":1,"tags":{"status":"500"}}
"#;
        let sub = Submetric::parse("http_reqs{status:200}").unwrap();
        let mut registry = MetricRegistry::new(vec![sub]);
        let buffer = SampleBuffer::new();

        let stats = read_samples(Cursor::new(input), &mut registry, &buffer).unwrap();
        assert_eq!(
            stats,
            ReadStats {
                lines: 3,
                samples: 3,
                rejected: 0
            }
        );

        let samples = buffer.drain();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].metric.meta.metric_type, MetricType::Trend);
        assert_eq!(samples[0].metric.submetrics.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_skips_bad_lines() {
        let input = r#"{"metric":"vus","type":"gauge","value":3}
not json
{"metric":"vus","type":"counter","value":1}
{"metric":"","value":1}
{"metric":"vus","type":"gauge","value":4}"#;
        let mut registry = MetricRegistry::default();
        let buffer = SampleBuffer::new();

        let stats = read_samples(Cursor::new(input), &mut registry, &buffer).unwrap();
        assert_eq!(stats.lines, 5);
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.rejected, 3);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let mut registry = MetricRegistry::default();
        let buffer = SampleBuffer::new();
        let dir = tempfile::tempdir().unwrap();
        let result = read_path(Some(&dir.path().join("nope.jsonl")), &mut registry, &buffer);
        assert!(result.is_err());
    }
}
