//! Median of integer timings by O(n) selection.

/// Median of a slice of integer nanosecond timings.
///
/// Odd lengths return the middle order statistic. Even lengths return the
/// midpoint of the two middle order statistics. The input is left untouched;
/// selection runs on a copy with `select_nth_unstable` instead of a full sort.
///
/// Returns `None` for an empty slice.
pub fn median_ns(samples: &[u64]) -> Option<f64> {
    let n = samples.len();
    if n == 0 {
        return None;
    }

    let mut working = samples.to_vec();
    let mid = n / 2;
    let (lower, &mut upper, _) = working.select_nth_unstable(mid);

    if n % 2 == 1 {
        return Some(upper as f64);
    }
    // Largest element below the pivot is the other middle statistic
    let below = lower.iter().copied().max().unwrap_or(upper);
    Some((below as f64 + upper as f64) / 2.0)
}
