//! Main `CacheProbe` entry point and builder.

use std::time::Instant;

use crate::arena::ProbeArena;
use crate::cache::Evictor;
use crate::config::{Config, WarmTarget};
use crate::error::Result;
use crate::measurement::{Clock, ClockSpec};
use crate::preflight::resolution_check;
use crate::rank::{rank, rank_by_median, Ranked};
use crate::result::{BatchedReport, ExperimentReport, LocationReport, Metadata};
use crate::sampling::{Sampler, SamplingPlan};
use crate::statistics::{aggregate_collection, contrast};

/// Run context for warm/cold cache experiments.
///
/// Owns the configuration; each run allocates its own arena and eviction
/// buffer, so two probes never share state.
///
/// # Example
///
/// ```ignore
/// use cache_probe::CacheProbe;
///
/// let report = CacheProbe::new()
///     .arena_size(5_000_000)
///     .trials(200)
///     .seed(7)
///     .run()?;
///
/// println!("{}", cache_probe::output::format_experiment(&report));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheProbe {
    config: Config,
}

impl CacheProbe {
    /// Create with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Create with the quick preset (50 trials over a 4 MiB arena).
    pub fn quick() -> Self {
        Self::with_config(Config::quick())
    }

    /// Create with the thorough preset (1000 trials).
    pub fn thorough() -> Self {
        Self::with_config(Config::thorough())
    }

    /// Create from an explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Apply `CP_*` environment overrides.
    pub fn from_env(self) -> Self {
        Self::with_config(self.config.with_env())
    }

    /// Set the arena size in bytes.
    pub fn arena_size(mut self, size: usize) -> Self {
        self.config.arena_size = size;
        self
    }

    /// Set explicit candidate offsets.
    pub fn indices(mut self, indices: Vec<usize>) -> Self {
        self.config.indices = Some(indices);
        self
    }

    /// Warm this arena offset every trial.
    pub fn warm_index(mut self, index: usize) -> Self {
        self.config.target = WarmTarget::Index(index);
        self
    }

    /// Measure without warming.
    pub fn no_warm(mut self) -> Self {
        self.config.target = WarmTarget::Disabled;
        self
    }

    /// Set reads per warming.
    pub fn warm_repetitions(mut self, repetitions: usize) -> Self {
        self.config.warm_repetitions = repetitions;
        self
    }

    /// Set eviction buffer size and stride.
    pub fn eviction(mut self, size: usize, stride: usize) -> Self {
        self.config.eviction_size = Some(size);
        self.config.eviction_stride = stride;
        self
    }

    /// Set the number of trials.
    pub fn trials(mut self, trials: usize) -> Self {
        self.config.trials = trials;
        self
    }

    /// Set reads per window for [`CacheProbe::run_batched`].
    pub fn batch_iterations(mut self, iterations: usize) -> Self {
        self.config.batch_iterations = iterations;
        self
    }

    /// Fix the measurement-order seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Select the clock.
    pub fn clock_spec(mut self, spec: ClockSpec) -> Self {
        self.config.clock = spec;
        self
    }

    /// Suppress diagnostic warnings.
    pub fn quiet(mut self) -> Self {
        self.config.quiet = true;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the configured clock and run the sampled experiment.
    pub fn run(&self) -> Result<ExperimentReport> {
        let mut clock = self.config.clock.build()?;
        self.run_with_clock(&mut clock)
    }

    /// Run the sampled experiment with a caller-supplied clock.
    ///
    /// Steps: allocate arena and eviction buffer (untimed), run the
    /// sampling loop, aggregate per candidate, rank by median, check clock
    /// resolution over every sample.
    pub fn run_with_clock<C: Clock + ?Sized>(&self, clock: &mut C) -> Result<ExperimentReport> {
        let start = Instant::now();

        let arena = ProbeArena::create(self.config.arena_size)?;
        let evictor = Evictor::new(
            self.config.effective_eviction_size(),
            self.config.eviction_stride,
        )?;
        let candidates = self.config.candidate_indices();
        let target = self.config.resolve_target(&candidates)?;

        let mut sampler = match self.config.seed {
            Some(seed) => Sampler::new(seed),
            None => Sampler::from_entropy(),
        };
        let plan = SamplingPlan {
            indices: &candidates,
            trials: self.config.trials,
            target,
            warm_repetitions: self.config.warm_repetitions,
        };
        let collection = sampler.sample(&arena, &evictor, &plan, clock)?;

        let summaries = aggregate_collection(&collection)?;
        let ranking = rank_by_median(&summaries);
        let contrast_ns = target.and_then(|t| contrast(&summaries, t));

        let all: Vec<u64> = collection
            .iter()
            .flat_map(|(_, s)| s.iter().copied())
            .collect();
        let warnings: Vec<_> = resolution_check(&all, clock.resolution_ns())
            .into_iter()
            .collect();
        if !self.config.quiet {
            for warning in &warnings {
                eprintln!("[cache-probe] {}", warning.description());
            }
        }

        let locations = summaries
            .iter()
            .map(|s| LocationReport {
                location: s.location,
                warmed: Some(s.location) == target,
                summary: s.summary,
            })
            .collect();

        Ok(ExperimentReport {
            locations,
            ranking,
            target,
            contrast_ns,
            trials: self.config.trials,
            arena_size: arena.len(),
            eviction: (evictor.size(), evictor.stride()),
            warnings,
            metadata: Metadata {
                clock: clock.name().to_string(),
                clock_resolution_ns: clock.resolution_ns(),
                seed: Some(sampler.seed()),
                runtime_secs: start.elapsed().as_secs_f64(),
            },
        })
    }

    /// Build the configured clock and run the batched experiment.
    pub fn run_batched(&self) -> Result<BatchedReport> {
        let mut clock = self.config.clock.build()?;
        self.run_batched_with_clock(&mut clock)
    }

    /// Warm once, then time `batch_iterations` reads per candidate in one
    /// window each and report the per-read average.
    pub fn run_batched_with_clock<C: Clock + ?Sized>(&self, clock: &mut C) -> Result<BatchedReport> {
        let start = Instant::now();

        let arena = ProbeArena::create(self.config.arena_size)?;
        let evictor = Evictor::new(
            self.config.effective_eviction_size(),
            self.config.eviction_stride,
        )?;
        let candidates = self.config.candidate_indices();
        let target = self.config.resolve_target(&candidates)?;

        let mut sampler = Sampler::new(self.config.seed.unwrap_or_default());
        let plan = SamplingPlan {
            indices: &candidates,
            trials: 1,
            target,
            warm_repetitions: self.config.warm_repetitions,
        };
        let averages = sampler.sample_batched(
            &arena,
            &evictor,
            &plan,
            self.config.batch_iterations,
            clock,
        )?;

        Ok(BatchedReport {
            ranking: rank(averages.iter().copied()),
            averages: averages
                .into_iter()
                .map(|(location, time_ns)| Ranked { location, time_ns })
                .collect(),
            target,
            iterations: self.config.batch_iterations,
            metadata: Metadata {
                clock: clock.name().to_string(),
                clock_resolution_ns: clock.resolution_ns(),
                seed: None,
                runtime_secs: start.elapsed().as_secs_f64(),
            },
        })
    }
}
