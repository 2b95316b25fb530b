use super::{clamp_pct, TrendEstimator};
use crate::defaults;
use crate::error::{ConfigError, MergeError, TrendError};
use hdrhistogram::Histogram;

/// Layout of the fixed-precision histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramSettings {
    /// Lowest discernible value (must be at least 1)
    pub low: u64,
    /// Highest trackable value
    pub high: u64,
    /// Significant decimal digits kept per bucket (0 to 5)
    pub sigfig: u8,
}

impl Default for HistogramSettings {
    fn default() -> Self {
        Self {
            low: defaults::HDR_LOWEST_VALUE,
            high: defaults::HDR_HIGHEST_VALUE,
            sigfig: defaults::HDR_SIGNIFICANT_DIGITS,
        }
    }
}

/// Trend backend recording into an HDR histogram.
///
/// Values are rounded to the nearest integer and recorded into their bucket;
/// anything negative, non-finite or above `high` is rejected instead of being
/// clamped. Percentiles come from bucket boundaries, so they carry the
/// relative error implied by `sigfig`.
///
/// Exact min, max and sum are tracked next to the buckets. They keep `min`,
/// `max` and `avg` exact and bound every percentile to the observed range.
#[derive(Debug, Clone)]
pub struct HistogramTrend {
    hdr: Histogram<u64>,
    min: f64,
    max: f64,
    sum: f64,
}

impl HistogramTrend {
    pub fn new(settings: HistogramSettings) -> Result<Self, ConfigError> {
        let hdr = Histogram::<u64>::new_with_bounds(settings.low, settings.high, settings.sigfig)
            .map_err(|e| {
                ConfigError::Histogram(format!(
                    "{:?} (low={}, high={}, sigfig={})",
                    e, settings.low, settings.high, settings.sigfig
                ))
            })?;

        Ok(Self {
            hdr,
            min: 0.0,
            max: 0.0,
            sum: 0.0,
        })
    }

    /// Highest value the histogram accepts.
    pub fn high(&self) -> u64 {
        self.hdr.high()
    }
}

impl TrendEstimator for HistogramTrend {
    fn add(&mut self, value: f64) -> Result<(), TrendError> {
        if !value.is_finite() {
            return Err(TrendError::NonFinite(value));
        }

        let rounded = value.round();
        if rounded < 0.0 || rounded > self.hdr.high() as f64 {
            return Err(TrendError::OutOfRange {
                value,
                max: self.hdr.high(),
            });
        }

        self.hdr
            .record(rounded as u64)
            .map_err(|e| TrendError::Record {
                value,
                reason: format!("{:?}", e),
            })?;

        if self.hdr.len() == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        Ok(())
    }

    fn p(&mut self, pct: f64) -> f64 {
        match self.hdr.len() {
            0 => 0.0,
            1 => self.min,
            _ => (self.hdr.value_at_quantile(clamp_pct(pct)) as f64).clamp(self.min, self.max),
        }
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn count(&self) -> u64 {
        self.hdr.len()
    }

    fn sum(&self) -> f64 {
        self.sum
    }

    fn merge(&mut self, other: &Self) -> Result<(), MergeError> {
        if other.is_empty() {
            return Ok(());
        }
        let was_empty = self.is_empty();

        self.hdr
            .add(&other.hdr)
            .map_err(|e| MergeError::Histogram(format!("{:?}", e)))?;

        if was_empty {
            self.min = other.min;
            self.max = other.max;
        } else {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
        self.sum += other.sum;
        Ok(())
    }
}
