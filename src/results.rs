use crate::report::{Report, ReportMetric};
use crate::trend::TrendBackendKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Report file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFile {
    pub metadata: ReportMetadata,
    pub metrics: BTreeMap<String, ReportMetric>,
}

/// Run metadata written next to the metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub elapsed: Duration,
    pub dropped_samples: u64,
    pub trend_backend: TrendBackendKind,
    pub trend_stats: Vec<String>,
}

/// Writes reports as pretty-printed JSON
pub struct ReportWriter {
    output_file: PathBuf,
    trend_backend: TrendBackendKind,
}

impl ReportWriter {
    /// Create a writer for the given output file
    pub fn new(output_file: &Path, trend_backend: TrendBackendKind) -> Self {
        Self {
            output_file: output_file.to_path_buf(),
            trend_backend,
        }
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Wrap a report with run metadata
    pub fn to_file(&self, report: &Report) -> ReportFile {
        ReportFile {
            metadata: ReportMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                elapsed: report.elapsed,
                dropped_samples: report.dropped_samples,
                trend_backend: self.trend_backend,
                trend_stats: report.trend_stats.clone(),
            },
            metrics: report.metrics.clone(),
        }
    }

    /// Write the report, replacing any existing file
    pub fn write(&self, report: &Report) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_file(report))
            .context("Failed to serialize report")?;
        std::fs::write(&self.output_file, json)
            .with_context(|| format!("Failed to write report to {:?}", self.output_file))?;

        info!("Report written to: {:?}", self.output_file);
        Ok(())
    }

    /// Load a report file written by [`ReportWriter::write`]
    pub fn read(path: &Path) -> Result<ReportFile> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report from {:?}", path))?;
        serde_json::from_str(&json).with_context(|| format!("Malformed report file {:?}", path))
    }
}
