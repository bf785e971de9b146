//! Position-frequency checks for randomized measurement order.
//!
//! If measurement order is unbiased, each location lands in each position
//! of a trial's order with equal frequency. A chi-square statistic over
//! those counts quantifies any systematic first/last bias.

/// Count how often each location appears at each position.
///
/// `counts[i][p]` is the number of trials in which `locations[i]` was
/// measured at position `p`. Orders containing unknown locations or of a
/// different length than `locations` are skipped.
pub fn position_counts(orders: &[Vec<usize>], locations: &[usize]) -> Vec<Vec<usize>> {
    let k = locations.len();
    let mut counts = vec![vec![0usize; k]; k];

    for order in orders.iter().filter(|o| o.len() == k) {
        for (position, location) in order.iter().enumerate() {
            if let Some(i) = locations.iter().position(|l| l == location) {
                counts[i][position] += 1;
            }
        }
    }

    counts
}

/// Pearson chi-square statistic of `observed` against a uniform expectation.
///
/// Degrees of freedom are `observed.len() - 1`. Returns 0 for empty or
/// all-zero input.
pub fn chi_square_uniform(observed: &[usize]) -> f64 {
    let total: usize = observed.iter().sum();
    if observed.is_empty() || total == 0 {
        return 0.0;
    }
    let expected = total as f64 / observed.len() as f64;
    observed
        .iter()
        .map(|&o| {
            let d = o as f64 - expected;
            d * d / expected
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_counts() {
        let orders = vec![vec![10, 20, 30], vec![30, 20, 10], vec![10, 30, 20]];
        let counts = position_counts(&orders, &[10, 20, 30]);
        assert_eq!(counts[0], vec![2, 0, 1]);
        assert_eq!(counts[1], vec![0, 2, 1]);
        assert_eq!(counts[2], vec![1, 1, 1]);
    }

    #[test]
    fn test_position_counts_skips_malformed() {
        let orders = vec![vec![10, 20], vec![10]];
        let counts = position_counts(&orders, &[10, 20]);
        assert_eq!(counts[0], vec![1, 0]);
    }

    #[test]
    fn test_chi_square() {
        assert_eq!(chi_square_uniform(&[25, 25, 25, 25]), 0.0);
        assert_eq!(chi_square_uniform(&[]), 0.0);
        assert_eq!(chi_square_uniform(&[0, 0]), 0.0);
        // Fully biased: all 100 in one bin, expected 50 each
        assert!((chi_square_uniform(&[100, 0]) - 100.0).abs() < 1e-12);
    }
}
