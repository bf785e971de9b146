//! Descriptive statistics per probe location.

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};
use crate::sampling::SampleCollection;

use super::quantile::median_ns;

/// Median, mean and population standard deviation of one location's timings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of samples summarised.
    pub count: usize,
    /// Middle value; average of the two middle values for even counts.
    pub median_ns: f64,
    /// Arithmetic mean.
    pub mean_ns: f64,
    /// Population standard deviation (divisor = count).
    pub stdev_ns: f64,
    /// Smallest sample.
    pub min_ns: u64,
    /// Largest sample.
    pub max_ns: u64,
}

/// Summarise a sequence of timings.
///
/// Does not modify its input, so calling it twice on the same samples gives
/// identical output.
///
/// # Errors
///
/// `DegenerateSample` if `samples` is empty.
pub fn summarize(samples: &[u64]) -> Result<Summary> {
    if samples.is_empty() {
        return Err(ProbeError::DegenerateSample { location: None });
    }

    let count = samples.len();
    let n = count as f64;

    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|&s| {
            let d = s as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    let median = median_ns(samples).ok_or(ProbeError::DegenerateSample { location: None })?;

    // Both exist: samples is non-empty
    let min_ns = samples.iter().copied().min().unwrap_or(0);
    let max_ns = samples.iter().copied().max().unwrap_or(0);

    Ok(Summary {
        count,
        median_ns: median,
        mean_ns: mean,
        stdev_ns: variance.sqrt(),
        min_ns,
        max_ns,
    })
}

/// Summary for one location of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    /// Arena offset (or page number) the samples belong to.
    pub location: usize,
    /// Statistics over that location's samples.
    pub summary: Summary,
}

/// Summarise every location of a collection, in collection order.
///
/// # Errors
///
/// `DegenerateSample` naming the first location that has no samples.
pub fn aggregate_collection(collection: &SampleCollection) -> Result<Vec<LocationSummary>> {
    collection
        .iter()
        .map(|(location, samples)| {
            summarize(samples)
                .map(|summary| LocationSummary { location, summary })
                .map_err(|_| ProbeError::DegenerateSample {
                    location: Some(location),
                })
        })
        .collect()
}

/// Gap between the target's median and the fastest other median.
///
/// Negative when the target is faster than every other location.
/// Returns `None` if the target is missing or there are no other locations.
pub fn contrast(summaries: &[LocationSummary], target: usize) -> Option<f64> {
    let target_median = summaries
        .iter()
        .find(|s| s.location == target)?
        .summary
        .median_ns;
    let fastest_other = summaries
        .iter()
        .filter(|s| s.location != target)
        .map(|s| s.summary.median_ns)
        .min_by(|a, b| a.total_cmp(b))?;
    Some(target_median - fastest_other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        let s = summarize(&[2, 4, 4, 4, 5, 5, 7, 9]).unwrap();
        assert_eq!(s.count, 8);
        assert!((s.mean_ns - 5.0).abs() < 1e-12);
        assert!((s.stdev_ns - 2.0).abs() < 1e-12);
        assert!((s.median_ns - 4.5).abs() < 1e-12);
        assert_eq!(s.min_ns, 2);
        assert_eq!(s.max_ns, 9);
    }

    #[test]
    fn test_single_sample() {
        let s = summarize(&[42]).unwrap();
        assert_eq!(s.median_ns, 42.0);
        assert_eq!(s.mean_ns, 42.0);
        assert_eq!(s.stdev_ns, 0.0);
    }

    #[test]
    fn test_equal_samples_zero_stdev() {
        let s = summarize(&[17; 50]).unwrap();
        assert_eq!(s.stdev_ns, 0.0);
        assert_eq!(s.median_ns, 17.0);
    }

    #[test]
    fn test_median_within_bounds() {
        let data: Vec<u64> = (0..101).map(|i| (i * 7919 % 1000) as u64).collect();
        let s = summarize(&data).unwrap();
        assert!(s.min_ns as f64 <= s.median_ns && s.median_ns <= s.max_ns as f64);
    }

    #[test]
    fn test_empty_is_degenerate() {
        assert_eq!(
            summarize(&[]).unwrap_err(),
            ProbeError::DegenerateSample { location: None }
        );
    }

    #[test]
    fn test_idempotent() {
        let data = vec![90, 12, 33, 33, 120, 4];
        assert_eq!(summarize(&data).unwrap(), summarize(&data).unwrap());
    }

    #[test]
    fn test_aggregate_names_empty_location() {
        let mut collection = SampleCollection::new(&[0, 64]);
        collection.push(0, 5).unwrap();
        assert_eq!(
            aggregate_collection(&collection).unwrap_err(),
            ProbeError::DegenerateSample { location: Some(64) }
        );
    }

    #[test]
    fn test_contrast() {
        let mut collection = SampleCollection::new(&[0, 1, 2]);
        for (loc, t) in [(0, 100), (1, 20), (2, 80)] {
            collection.push(loc, t).unwrap();
        }
        let summaries = aggregate_collection(&collection).unwrap();
        assert_eq!(contrast(&summaries, 1), Some(-60.0));
        assert_eq!(contrast(&summaries, 0), Some(20.0));
        assert_eq!(contrast(&summaries, 9), None);
    }
}
