use super::{clamp_pct, TrendEstimator};
use crate::error::{MergeError, TrendError};

/// Trend backend that keeps every observed value.
///
/// Values are sorted lazily, only when a percentile is requested after new
/// values arrived. Percentiles interpolate linearly between the order
/// statistics around the fractional rank `pct * (count - 1)`.
#[derive(Debug, Clone, Default)]
pub struct ExactTrend {
    values: Vec<f64>,
    sorted: bool,
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
}

impl ExactTrend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw values in their current order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.values.sort_by(f64::total_cmp);
            self.sorted = true;
        }
    }
}

impl TrendEstimator for ExactTrend {
    fn add(&mut self, value: f64) -> Result<(), TrendError> {
        if !value.is_finite() {
            return Err(TrendError::NonFinite(value));
        }

        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        self.values.push(value);
        self.sorted = false;
        self.count += 1;
        self.sum += value;
        Ok(())
    }

    fn p(&mut self, pct: f64) -> f64 {
        match self.count {
            0 => 0.0,
            1 => self.values[0],
            n => {
                self.ensure_sorted();
                let rank = clamp_pct(pct) * (n - 1) as f64;
                let lo = rank.floor();
                let lower = self.values[lo as usize];
                let upper = self.values[rank.ceil() as usize];
                lower + (upper - lower) * (rank - lo)
            }
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
        if self.count == 0 {
            self.min = other.min;
            self.max = other.max;
        } else {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }

        self.values.extend_from_slice(&other.values);
        self.sorted = false;
        self.count += other.count;
        self.sum += other.sum;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trend(values: &[f64]) -> ExactTrend {
        let mut t = ExactTrend::new();
        for &v in values {
            t.add(v).unwrap();
        }
        t
    }

    #[test]
    fn test_one_to_five() {
        let mut t = trend(&[3.0, 1.0, 5.0, 2.0, 4.0]);
        assert_eq!(t.p(0.5), 3.0);
        assert_eq!(t.min(), 1.0);
        assert_eq!(t.max(), 5.0);
        assert_eq!(t.avg(), 3.0);
        assert_eq!(t.count(), 5);
    }

    #[test]
    fn test_percentile_interpolation() {
        let mut t = trend(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        // rank 0.9 * 4 = 3.6 -> between 4 and 5
        assert!((t.p(0.9) - 4.6).abs() < 1e-9);
        assert!((t.p(0.95) - 4.8).abs() < 1e-9);
        assert_eq!(t.p(0.0), 1.0);
        assert_eq!(t.p(1.0), 5.0);
    }

    #[test]
    fn test_percentile_clamps_fraction() {
        let mut t = trend(&[10.0, 20.0]);
        assert_eq!(t.p(-1.0), 10.0);
        assert_eq!(t.p(2.0), 20.0);
        assert_eq!(t.p(f64::NAN), 10.0);
    }

    #[test]
    fn test_resorts_after_new_values() {
        let mut t = trend(&[5.0, 1.0]);
        assert_eq!(t.p(1.0), 5.0);
        t.add(9.0).unwrap();
        t.add(0.5).unwrap();
        assert_eq!(t.p(1.0), 9.0);
        assert_eq!(t.p(0.0), 0.5);
    }

    #[test]
    fn test_negative_values() {
        let mut t = trend(&[-3.0, -1.0, -2.0]);
        assert_eq!(t.min(), -3.0);
        assert_eq!(t.max(), -1.0);
        assert_eq!(t.p(0.5), -2.0);
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut t = ExactTrend::new();
        assert!(t.add(f64::NAN).is_err());
        assert_eq!(
            t.add(f64::INFINITY),
            Err(TrendError::NonFinite(f64::INFINITY))
        );
        assert!(t.is_empty());
    }

    #[test]
    fn test_merge_appends_raw_values() {
        let mut a = trend(&[1.0, 2.0]);
        let b = trend(&[3.0, 4.0, 5.0]);
        a.merge(&b).unwrap();
        assert_eq!(a.count(), 5);
        assert_eq!(a.values().len(), 5);
        assert_eq!(a.min(), 1.0);
        assert_eq!(a.max(), 5.0);
        assert_eq!(a.p(0.5), 3.0);
    }

    #[test]
    fn test_merge_into_empty() {
        let mut empty = ExactTrend::new();
        empty.merge(&trend(&[7.0, 8.0])).unwrap();
        assert_eq!(empty.min(), 7.0);
        assert_eq!(empty.max(), 8.0);

        let mut t = trend(&[7.0]);
        t.merge(&ExactTrend::new()).unwrap();
        assert_eq!(t.count(), 1);
        assert_eq!(t.min(), 7.0);
    }
}
