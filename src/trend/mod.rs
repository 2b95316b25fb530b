//! # Trend Backends
//!
//! Percentile engines behind `Trend` sinks. Three interchangeable strategies
//! share the [`TrendEstimator`] contract:
//!
//! - **Exact** ([`ExactTrend`]): keeps every value, interpolates between
//!   order statistics. O(n) memory, exact answers.
//! - **Histogram** ([`HistogramTrend`]): HDR histogram over a fixed value range
//!   with a fixed number of significant digits. Constant memory, bounded
//!   relative error.
//! - **Sketch** ([`SketchTrend`]): DDSketch with a target relative accuracy.
//!   Bounded memory, accepts any finite value.
//!
//! ## Degenerate inputs
//!
//! All backends answer identically when they hold zero or one value:
//!
//! - Count = 0: `p(any) = min = max = avg = 0`
//! - Count = 1: `p(any) = min = max = avg = the value`
//!
//! ## Selection
//!
//! The backend is chosen once at startup through [`TrendFactory`], which is
//! then cloned into every place that needs fresh trend state. There is no
//! global default and no runtime re-selection.

use crate::error::{ConfigError, MergeError, TrendError};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

mod exact;
mod histogram;
mod sketch;

pub use exact::ExactTrend;
pub use histogram::{HistogramSettings, HistogramTrend};
pub use sketch::{SketchSettings, SketchTrend};

/// Contract shared by every percentile engine.
pub trait TrendEstimator {
    /// Record a single value.
    fn add(&mut self, value: f64) -> Result<(), TrendError>;

    /// Value at percentile `pct`, a fraction within `[0, 1]`.
    ///
    /// Out-of-range fractions are clamped. Takes `&mut self` so that
    /// backends may prepare internal state lazily.
    fn p(&mut self, pct: f64) -> f64;

    fn min(&self) -> f64;

    fn max(&self) -> f64;

    /// Number of recorded values.
    fn count(&self) -> u64;

    /// Sum of recorded values.
    fn sum(&self) -> f64;

    /// Arithmetic mean, zero when empty.
    fn avg(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum() / n as f64,
        }
    }

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Fold another instance of the same backend into this one.
    fn merge(&mut self, other: &Self) -> Result<(), MergeError>
    where
        Self: Sized;
}

/// Clamp a percentile fraction into `[0, 1]`; NaN maps to 0.
pub(crate) fn clamp_pct(pct: f64) -> f64 {
    if pct.is_nan() {
        0.0
    } else {
        pct.clamp(0.0, 1.0)
    }
}

/// Available trend backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendBackendKind {
    /// Keep every value (exact percentiles)
    #[default]
    #[value(name = "exact", alias = "k6")]
    Exact,

    /// HDR histogram (fixed precision, constant memory)
    #[value(name = "hdr")]
    Histogram,

    /// DDSketch (relative-error sketch, bounded memory)
    #[value(name = "dds")]
    Sketch,
}

impl fmt::Display for TrendBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendBackendKind::Exact => write!(f, "exact"),
            TrendBackendKind::Histogram => write!(f, "hdr"),
            TrendBackendKind::Sketch => write!(f, "dds"),
        }
    }
}

/// A trend backend instance.
#[derive(Debug, Clone)]
pub enum TrendBackend {
    Exact(ExactTrend),
    Histogram(HistogramTrend),
    Sketch(SketchTrend),
}

impl TrendBackend {
    pub fn kind(&self) -> TrendBackendKind {
        match self {
            TrendBackend::Exact(_) => TrendBackendKind::Exact,
            TrendBackend::Histogram(_) => TrendBackendKind::Histogram,
            TrendBackend::Sketch(_) => TrendBackendKind::Sketch,
        }
    }
}

impl TrendEstimator for TrendBackend {
    fn add(&mut self, value: f64) -> Result<(), TrendError> {
        match self {
            TrendBackend::Exact(t) => t.add(value),
            TrendBackend::Histogram(t) => t.add(value),
            TrendBackend::Sketch(t) => t.add(value),
        }
    }

    fn p(&mut self, pct: f64) -> f64 {
        match self {
            TrendBackend::Exact(t) => t.p(pct),
            TrendBackend::Histogram(t) => t.p(pct),
            TrendBackend::Sketch(t) => t.p(pct),
        }
    }

    fn min(&self) -> f64 {
        match self {
            TrendBackend::Exact(t) => t.min(),
            TrendBackend::Histogram(t) => t.min(),
            TrendBackend::Sketch(t) => t.min(),
        }
    }

    fn max(&self) -> f64 {
        match self {
            TrendBackend::Exact(t) => t.max(),
            TrendBackend::Histogram(t) => t.max(),
            TrendBackend::Sketch(t) => t.max(),
        }
    }

    fn count(&self) -> u64 {
        match self {
            TrendBackend::Exact(t) => t.count(),
            TrendBackend::Histogram(t) => t.count(),
            TrendBackend::Sketch(t) => t.count(),
        }
    }

    fn sum(&self) -> f64 {
        match self {
            TrendBackend::Exact(t) => t.sum(),
            TrendBackend::Histogram(t) => t.sum(),
            TrendBackend::Sketch(t) => t.sum(),
        }
    }

    fn merge(&mut self, other: &Self) -> Result<(), MergeError> {
        match (self, other) {
            (TrendBackend::Exact(a), TrendBackend::Exact(b)) => a.merge(b),
            (TrendBackend::Histogram(a), TrendBackend::Histogram(b)) => a.merge(b),
            (TrendBackend::Sketch(a), TrendBackend::Sketch(b)) => a.merge(b),
            (target, other) => Err(MergeError::TrendBackend {
                target: target.kind(),
                other: other.kind(),
            }),
        }
    }
}

/// Builds empty trend backends of the configured kind.
///
/// Backend parameters are validated once in [`TrendFactory::new`]; the factory
/// keeps an empty prototype and hands out clones of it.
#[derive(Debug, Clone)]
pub struct TrendFactory {
    prototype: TrendBackend,
}

impl TrendFactory {
    pub fn new(
        kind: TrendBackendKind,
        histogram: HistogramSettings,
        sketch: SketchSettings,
    ) -> Result<Self, ConfigError> {
        let prototype = match kind {
            TrendBackendKind::Exact => TrendBackend::Exact(ExactTrend::new()),
            TrendBackendKind::Histogram => TrendBackend::Histogram(HistogramTrend::new(histogram)?),
            TrendBackendKind::Sketch => TrendBackend::Sketch(SketchTrend::new(sketch)?),
        };
        Ok(Self { prototype })
    }

    /// Factory for the exact backend, which has no parameters to validate.
    pub fn exact() -> Self {
        Self {
            prototype: TrendBackend::Exact(ExactTrend::new()),
        }
    }

    pub fn kind(&self) -> TrendBackendKind {
        self.prototype.kind()
    }

    /// A fresh, empty backend.
    pub fn build(&self) -> TrendBackend {
        self.prototype.clone()
    }
}

impl Default for TrendFactory {
    fn default() -> Self {
        Self::exact()
    }
}
