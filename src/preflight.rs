//! Clock resolution check over collected samples.
//!
//! A clock that is coarse relative to a single memory access reports most
//! reads as 0 or one tick. Medians then collapse onto a handful of values
//! and the warm/cold contrast is invisible. This check flags that before
//! anyone reads meaning into the ranking.

use serde::{Deserialize, Serialize};

/// Minimum unique values expected per 1000 samples.
const MIN_UNIQUE_PER_1000: usize = 20;

/// Fraction of zero readings that makes the warning critical.
const CRITICAL_ZERO_FRACTION: f64 = 0.5;

/// Warning from the resolution check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolutionWarning {
    /// Most reads completed within one clock tick.
    InsufficientResolution {
        /// Distinct timing values observed.
        unique_values: usize,
        /// Total samples checked.
        total_samples: usize,
        /// Fraction of samples that were zero.
        zero_fraction: f64,
        /// Clock resolution in nanoseconds.
        clock_resolution_ns: f64,
    },

    /// Timings cluster on a few values.
    HighQuantization {
        /// Distinct timing values observed.
        unique_values: usize,
        /// Total samples checked.
        total_samples: usize,
    },
}

impl ResolutionWarning {
    /// Whether the ranking should be treated as meaningless.
    pub fn is_critical(&self) -> bool {
        matches!(self, ResolutionWarning::InsufficientResolution { .. })
    }

    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            ResolutionWarning::InsufficientResolution {
                unique_values,
                total_samples,
                zero_fraction,
                clock_resolution_ns,
            } => format!(
                "clock resolution (~{:.0}ns) is too coarse for single reads: \
                 {} unique values in {} samples ({:.1}% zero). \
                 Use the batched experiment or a cycle clock.",
                clock_resolution_ns,
                unique_values,
                total_samples,
                zero_fraction * 100.0
            ),
            ResolutionWarning::HighQuantization {
                unique_values,
                total_samples,
            } => format!(
                "high quantization: only {} unique values in {} samples",
                unique_values, total_samples
            ),
        }
    }
}

/// Check samples for signs of a clock too coarse to resolve them.
///
/// Returns `None` with fewer than 100 samples.
pub fn resolution_check(samples: &[u64], clock_resolution_ns: f64) -> Option<ResolutionWarning> {
    if samples.len() < 100 {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let unique_count = sorted.len();

    let zero_count = samples.iter().filter(|&&x| x == 0).count();
    let zero_fraction = zero_count as f64 / samples.len() as f64;

    let expected_unique =
        (samples.len() as f64 / 1000.0 * MIN_UNIQUE_PER_1000 as f64).max(10.0) as usize;

    if unique_count < expected_unique && zero_fraction > CRITICAL_ZERO_FRACTION {
        return Some(ResolutionWarning::InsufficientResolution {
            unique_values: unique_count,
            total_samples: samples.len(),
            zero_fraction,
            clock_resolution_ns,
        });
    }

    if unique_count < expected_unique / 2 {
        return Some(ResolutionWarning::HighQuantization {
            unique_values: unique_count,
            total_samples: samples.len(),
        });
    }

    None
}
