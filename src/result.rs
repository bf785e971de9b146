//! Report types produced by experiment and simulation runs.

use serde::{Deserialize, Serialize};

use crate::preflight::ResolutionWarning;
use crate::rank::Ranked;
use crate::simulator::AccessPath;
use crate::statistics::Summary;

/// Report of a sampled warm/cold experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// One row per candidate, in candidate order.
    pub locations: Vec<LocationReport>,

    /// Candidates ranked by median, fastest first.
    pub ranking: Vec<Ranked>,

    /// Warmed index, if any.
    pub target: Option<usize>,

    /// Target median minus the fastest other median (negative = target fastest).
    pub contrast_ns: Option<f64>,

    /// Trials run.
    pub trials: usize,

    /// Arena size in bytes.
    pub arena_size: usize,

    /// Eviction buffer size and stride in bytes.
    pub eviction: (usize, usize),

    /// Resolution warnings raised over all samples.
    pub warnings: Vec<ResolutionWarning>,

    /// Metadata for debugging.
    pub metadata: Metadata,
}

impl ExperimentReport {
    /// The fastest candidate.
    pub fn fastest(&self) -> Option<&Ranked> {
        self.ranking.first()
    }

    /// Whether the warmed target ranked first.
    pub fn target_is_fastest(&self) -> bool {
        match (self.target, self.fastest()) {
            (Some(target), Some(fastest)) => fastest.location == target,
            _ => false,
        }
    }
}

/// Statistics for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationReport {
    /// Arena offset.
    pub location: usize,
    /// Whether this candidate was warmed each trial.
    pub warmed: bool,
    /// Median / mean / stdev of its timings.
    pub summary: Summary,
}

/// Report of the batched single-pass experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchedReport {
    /// Average ns per read, in candidate order.
    pub averages: Vec<Ranked>,
    /// Candidates ranked by average, fastest first.
    pub ranking: Vec<Ranked>,
    /// Warmed index, if any.
    pub target: Option<usize>,
    /// Reads per timing window.
    pub iterations: usize,
    /// Metadata for debugging.
    pub metadata: Metadata,
}

impl BatchedReport {
    /// Whether the warmed target had the lowest average.
    pub fn target_is_fastest(&self) -> bool {
        match (self.target, self.ranking.first()) {
            (Some(target), Some(fastest)) => fastest.location == target,
            _ => false,
        }
    }
}

/// One page of a simulation ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedPage {
    /// Probe page number, read as a byte value.
    pub page: usize,
    /// The page as a printable character, or its hex value.
    pub character: String,
    /// Representative latency in nanoseconds.
    pub time_ns: f64,
}

impl RankedPage {
    /// Build an entry, rendering the page as a character.
    pub fn new(page: usize, time_ns: f64) -> Self {
        Self {
            page,
            character: display_byte(page),
            time_ns,
        }
    }
}

/// Printable ASCII as itself, anything else as `0xNN`.
pub fn display_byte(value: usize) -> String {
    if (32..127).contains(&value) {
        char::from(value as u8).to_string()
    } else {
        format!("0x{:02x}", value)
    }
}

/// Report of one simulated leak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Queried index.
    pub query_index: usize,
    /// Length of the local secret.
    pub secret_len: usize,
    /// Branch the access function took.
    pub path: AccessPath,
    /// Page the access function touched (instrumentation, not timing).
    pub touched_page: usize,
    /// Fastest pages, fastest first.
    pub top: Vec<RankedPage>,
    /// True byte at the queried index, if in bounds.
    pub expected_byte: Option<u8>,
    /// Byte value of the fastest page.
    pub inferred_byte: Option<u8>,
    /// Whether inference matched the truth (`None` out of bounds).
    pub recovered: Option<bool>,
    /// Clear → evict → invoke → measure repetitions.
    pub rounds: usize,
    /// Resolution warnings raised over all page timings.
    pub warnings: Vec<ResolutionWarning>,
    /// Metadata for debugging.
    pub metadata: Metadata,
}

/// Run metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Clock used ("rdtsc", "cntvct_el0", "Instant", ...).
    pub clock: String,
    /// Clock resolution in nanoseconds.
    pub clock_resolution_ns: f64,
    /// Seed of the measurement-order RNG.
    pub seed: Option<u64>,
    /// Wall-clock runtime in seconds.
    pub runtime_secs: f64,
}
