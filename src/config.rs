//! Configuration for cache experiments and the secret-byte simulation.

use std::env;

use serde::{Deserialize, Serialize};

use crate::arena::{CACHE_LINE, PAGE_SIZE};
use crate::error::{ProbeError, Result};
use crate::measurement::ClockSpec;

/// Which location a sampling run warms each trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarmTarget {
    /// Warm the candidate at this position of the candidate list.
    Candidate(usize),
    /// Warm this arena offset.
    Index(usize),
    /// Measure without warming anything.
    Disabled,
}

impl Default for WarmTarget {
    fn default() -> Self {
        WarmTarget::Candidate(2)
    }
}

/// Configuration options for [`CacheProbe`](crate::CacheProbe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Arena size in bytes (default: 6,000,000).
    pub arena_size: usize,

    /// Candidate offsets. `None` spans start, quarters and end of the arena.
    pub indices: Option<Vec<usize>>,

    /// Location warmed before each trial's measurements (default: the middle candidate).
    pub target: WarmTarget,

    /// Reads per warming (default: 2,000).
    pub warm_repetitions: usize,

    /// Eviction buffer size in bytes. `None` uses twice the arena.
    pub eviction_size: Option<usize>,

    /// Bytes between reads of the eviction sweep (default: 64, one cache line).
    ///
    /// A page-sized stride only touches the cache sets at page offset 0, so
    /// candidates at any other offset would stay cached across trials.
    pub eviction_stride: usize,

    /// Number of trials (default: 300).
    pub trials: usize,

    /// Reads per timing window in the batched experiment (default: 100).
    pub batch_iterations: usize,

    /// Optional deterministic seed for measurement order.
    pub seed: Option<u64>,

    /// Clock selection (default: Auto).
    pub clock: ClockSpec,

    /// Suppress diagnostic warnings on stderr.
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arena_size: 6_000_000,
            indices: None,
            target: WarmTarget::default(),
            warm_repetitions: 2_000,
            eviction_size: None,
            eviction_stride: CACHE_LINE,
            trials: 300,
            batch_iterations: 100,
            seed: None,
            clock: ClockSpec::Auto,
            quiet: false,
        }
    }
}

impl Config {
    /// Fewer trials over a smaller arena, for smoke runs.
    pub fn quick() -> Self {
        Self {
            arena_size: 1 << 22,
            trials: 50,
            warm_repetitions: 500,
            ..Self::default()
        }
    }

    /// More trials for a tighter median.
    pub fn thorough() -> Self {
        Self {
            trials: 1_000,
            ..Self::default()
        }
    }

    /// The simple page-stride sweep over half the arena.
    ///
    /// Cheap, but it only displaces lines at page offset 0: candidates at
    /// other offsets stay warm from the previous trial. Kept to show why the
    /// default sweeps every cache line.
    pub fn page_sweep() -> Self {
        let base = Self::default();
        Self {
            eviction_size: Some(base.arena_size / 2),
            eviction_stride: PAGE_SIZE,
            ..base
        }
    }

    /// Apply `CP_*` environment overrides on top of `self`.
    ///
    /// Recognised: `CP_TRIALS`, `CP_SEED`, `CP_WARM_REPS`, `CP_ARENA_SIZE`,
    /// `CP_EVICT_SIZE`, `CP_EVICT_STRIDE`, `CP_CLOCK` (`auto`, `monotonic`,
    /// `cycle`), `CP_QUIET`. Unparseable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Some(trials) = parse_usize_env("CP_TRIALS") {
            self.trials = trials;
        }
        if let Some(seed) = parse_u64_env("CP_SEED") {
            self.seed = Some(seed);
        }
        if let Some(reps) = parse_usize_env("CP_WARM_REPS") {
            self.warm_repetitions = reps;
        }
        if let Some(size) = parse_usize_env("CP_ARENA_SIZE") {
            self.arena_size = size;
        }
        if let Some(size) = parse_usize_env("CP_EVICT_SIZE") {
            self.eviction_size = Some(size);
        }
        if let Some(stride) = parse_usize_env("CP_EVICT_STRIDE") {
            self.eviction_stride = stride;
        }
        if let Some(clock) = parse_clock_env("CP_CLOCK") {
            self.clock = clock;
        }
        if parse_bool_env("CP_QUIET") {
            self.quiet = true;
        }
        self
    }

    /// Defaults with environment overrides.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Candidate offsets for this configuration.
    pub fn candidate_indices(&self) -> Vec<usize> {
        match &self.indices {
            Some(indices) => indices.clone(),
            None => spanning_indices(self.arena_size),
        }
    }

    /// Resolve the warm target against the candidate list.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if a `Candidate` position does not exist.
    pub fn resolve_target(&self, candidates: &[usize]) -> Result<Option<usize>> {
        match self.target {
            WarmTarget::Candidate(position) => candidates
                .get(position)
                .copied()
                .map(Some)
                .ok_or(ProbeError::OutOfRange {
                    index: position,
                    len: candidates.len(),
                }),
            WarmTarget::Index(index) => Ok(Some(index)),
            WarmTarget::Disabled => Ok(None),
        }
    }

    /// Effective eviction buffer size.
    pub fn effective_eviction_size(&self) -> usize {
        self.eviction_size
            .unwrap_or_else(|| self.arena_size.saturating_mul(2))
            .max(1)
    }
}

/// Start, quarter, half, three-quarter and last offsets of an arena.
pub fn spanning_indices(size: usize) -> Vec<usize> {
    if size == 0 {
        return Vec::new();
    }
    // floor(3 * size / 4) without overflowing
    let three_quarters = size / 4 * 3 + size % 4 * 3 / 4;
    let mut indices = vec![0, size / 4, size / 2, three_quarters, size - 1];
    indices.dedup();
    indices
}

/// Configuration for [`SpectreSimulation`](crate::SpectreSimulation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Bytes per probe page (default: 4096).
    pub page_size: usize,

    /// Number of probe pages, one per byte value (default: 256).
    pub pages: usize,

    /// Page touched when the queried index is outside the secret (default: 0).
    pub default_page: usize,

    /// In-bounds index used for training (default: 0).
    pub training_index: usize,

    /// Training invocations before each leak (default: 200).
    pub training_rounds: usize,

    /// Clear → evict → invoke → measure repetitions (default: 1).
    ///
    /// With more than one round each page is represented by its median.
    pub rounds: usize,

    /// Pages listed in the report (default: 6).
    pub top_n: usize,

    /// Eviction buffer size in bytes (default: 8 MiB).
    pub eviction_size: usize,

    /// Eviction sweep stride in bytes (default: 64).
    pub eviction_stride: usize,

    /// Clock selection (default: Auto).
    pub clock: ClockSpec,

    /// Suppress diagnostic warnings on stderr.
    pub quiet: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            pages: 256,
            default_page: 0,
            training_index: 0,
            training_rounds: 200,
            rounds: 1,
            top_n: 6,
            eviction_size: 8 << 20,
            eviction_stride: CACHE_LINE,
            clock: ClockSpec::Auto,
            quiet: false,
        }
    }
}

impl SimulationConfig {
    /// Several rounds with a median per page, for noisy machines.
    pub fn voted(rounds: usize) -> Self {
        Self {
            rounds,
            ..Self::default()
        }
    }
}

fn parse_usize_env(key: &str) -> Option<usize> {
    env::var(key).ok()?.parse().ok()
}

fn parse_u64_env(key: &str) -> Option<u64> {
    env::var(key).ok()?.parse().ok()
}

fn parse_bool_env(key: &str) -> bool {
    matches!(env::var(key), Ok(val) if val == "1" || val.eq_ignore_ascii_case("true"))
}

fn parse_clock_env(key: &str) -> Option<ClockSpec> {
    match env::var(key).ok()?.to_ascii_lowercase().as_str() {
        "auto" => Some(ClockSpec::Auto),
        "monotonic" | "instant" => Some(ClockSpec::Monotonic),
        "cycle" | "rdtsc" => Some(ClockSpec::Cycle),
        _ => None,
    }
}
