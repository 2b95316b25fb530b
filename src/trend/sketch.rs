use super::{clamp_pct, TrendEstimator};
use crate::defaults;
use crate::error::{ConfigError, MergeError, TrendError};
use sketches_ddsketch::{Config, DDSketch};
use std::fmt;

/// Values closer to zero than this share the sketch's zero bucket.
const MIN_INDEXED_VALUE: f64 = 1.0e-9;

/// Parameters of the relative-error sketch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SketchSettings {
    /// Target relative accuracy of percentile answers, e.g. 0.01 for 1%
    pub relative_accuracy: f64,
    /// Upper bound on the number of bins per sketch
    pub max_bins: u32,
}

impl Default for SketchSettings {
    fn default() -> Self {
        Self {
            relative_accuracy: defaults::DDS_RELATIVE_ACCURACY,
            max_bins: defaults::DDS_MAX_BINS,
        }
    }
}

/// Trend backend backed by a DDSketch.
///
/// Count, sum, min and max are maintained alongside the sketch so that
/// averages and extremes are exact; percentiles are read from the sketch and
/// bounded to the observed range.
#[derive(Clone)]
pub struct SketchTrend {
    sketch: DDSketch,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl SketchTrend {
    pub fn new(settings: SketchSettings) -> Result<Self, ConfigError> {
        let accuracy = settings.relative_accuracy;
        if !(accuracy > 0.0 && accuracy < 1.0) {
            return Err(ConfigError::SketchAccuracy(accuracy));
        }
        if settings.max_bins == 0 {
            return Err(ConfigError::SketchBins);
        }

        let config = Config::new(accuracy, settings.max_bins, MIN_INDEXED_VALUE);
        Ok(Self {
            sketch: DDSketch::new(config),
            count: 0,
            sum: 0.0,
            min: 0.0,
            max: 0.0,
        })
    }
}

impl fmt::Debug for SketchTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SketchTrend")
            .field("count", &self.count)
            .field("sum", &self.sum)
            .field("min", &self.min)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

impl TrendEstimator for SketchTrend {
    fn add(&mut self, value: f64) -> Result<(), TrendError> {
        if !value.is_finite() {
            return Err(TrendError::NonFinite(value));
        }

        self.sketch.add(value);
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        Ok(())
    }

    fn p(&mut self, pct: f64) -> f64 {
        match self.count {
            0 => 0.0,
            1 => self.min,
            _ => self
                .sketch
                .quantile(clamp_pct(pct))
                .ok()
                .flatten()
                .map_or(self.min, |v| v.clamp(self.min, self.max)),
        }
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn sum(&self) -> f64 {
        self.sum
    }

    fn merge(&mut self, other: &Self) -> Result<(), MergeError> {
        if other.count == 0 {
            return Ok(());
        }

        self.sketch
            .merge(&other.sketch)
            .map_err(|e| MergeError::Sketch(format!("{:?}", e)))?;

        if self.count == 0 {
            self.min = other.min;
            self.max = other.max;
        } else {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
        self.count += other.count;
        self.sum += other.sum;
        Ok(())
    }
}
