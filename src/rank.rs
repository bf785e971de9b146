//! Ranking of probe locations by observed latency.

use serde::{Deserialize, Serialize};

use crate::statistics::LocationSummary;

/// One entry of a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ranked {
    /// Arena offset or probe page number.
    pub location: usize,
    /// Representative latency in nanoseconds.
    pub time_ns: f64,
}

/// Sort `(location, time)` pairs ascending by time.
///
/// The sort is stable, so equal times keep their input order.
pub fn rank<I>(entries: I) -> Vec<Ranked>
where
    I: IntoIterator<Item = (usize, f64)>,
{
    let mut ranked: Vec<Ranked> = entries
        .into_iter()
        .map(|(location, time_ns)| Ranked { location, time_ns })
        .collect();
    ranked.sort_by(|a, b| a.time_ns.total_cmp(&b.time_ns));
    ranked
}

/// Rank aggregated locations by median.
///
/// The median is preferred over the mean: rare latency spikes from
/// scheduling or interrupts pull the mean but not the median.
pub fn rank_by_median(summaries: &[LocationSummary]) -> Vec<Ranked> {
    rank(summaries.iter().map(|s| (s.location, s.summary.median_ns)))
}

/// Rank raw single timings, one per location.
pub fn rank_raw(timings: &[(usize, u64)]) -> Vec<Ranked> {
    rank(timings.iter().map(|&(loc, ns)| (loc, ns as f64)))
}
