//! Sandboxed simulation of a Spectre-style secret leak.
//!
//! A local secret is mapped onto a probe arena of one page per byte value:
//! reading `secret[i] = v` touches page `v`. After the touch, timing every
//! page reveals which one is warm, and so which value was read. Nothing here
//! executes speculatively and nothing reads outside owned buffers: an
//! out-of-bounds query takes an explicit fallback branch that touches a
//! fixed default page instead.

use std::hint::black_box;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::arena::ProbeArena;
use crate::cache::Evictor;
use crate::config::SimulationConfig;
use crate::error::{ProbeError, Result};
use crate::measurement::{timed_read, Clock};
use crate::preflight::resolution_check;
use crate::rank::{rank_by_median, Ranked};
use crate::result::{Metadata, RankedPage, SimulationReport};
use crate::sampling::SampleCollection;
use crate::statistics::aggregate_collection;

/// Number of distinct byte values, and so the minimum number of probe pages.
pub const BYTE_VALUES: usize = 256;

/// Which branch of the access function ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessPath {
    /// Index was within the secret; the secret byte chose the page.
    InBounds,
    /// Index was outside the secret; the default page was touched.
    Fallback,
}

/// Record of one access-function invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Touch {
    /// Probe page that was touched.
    pub page: usize,
    /// Branch that ran.
    pub path: AccessPath,
}

/// The secret, its probe arena and instrumentation.
#[derive(Debug, Clone)]
pub struct SecretSimulator {
    secret: Vec<u8>,
    probe: ProbeArena,
    page_size: usize,
    pages: usize,
    default_page: usize,
    secret_reads: usize,
    last_touch: Option<Touch>,
}

impl SecretSimulator {
    /// Build a simulator over `secret` with `pages` probe pages.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the secret is empty, `page_size` is zero, there are
    /// fewer than 256 pages, or `default_page` is not a probe page.
    pub fn new(secret: &[u8], pages: usize, page_size: usize, default_page: usize) -> Result<Self> {
        if secret.is_empty() {
            return Err(ProbeError::OutOfRange { index: 0, len: 0 });
        }
        if page_size == 0 {
            return Err(ProbeError::OutOfRange { index: 0, len: 0 });
        }
        if pages < BYTE_VALUES {
            return Err(ProbeError::OutOfRange {
                index: BYTE_VALUES - 1,
                len: pages,
            });
        }
        if default_page >= pages {
            return Err(ProbeError::OutOfRange {
                index: default_page,
                len: pages,
            });
        }

        Ok(Self {
            secret: secret.to_vec(),
            probe: ProbeArena::for_pages(pages, page_size)?,
            page_size,
            pages,
            default_page,
            secret_reads: 0,
            last_touch: None,
        })
    }

    /// Build a simulator from a configuration.
    pub fn from_config(secret: &[u8], config: &SimulationConfig) -> Result<Self> {
        Self::new(secret, config.pages, config.page_size, config.default_page)
    }

    /// Length of the secret.
    pub fn secret_len(&self) -> usize {
        self.secret.len()
    }

    /// Ground truth for an index, for comparison only.
    pub fn expected(&self, index: usize) -> Option<u8> {
        self.secret.get(index).copied()
    }

    /// Number of probe pages.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Arena offset of the start of `page`.
    pub fn page_offset(&self, page: usize) -> usize {
        page * self.page_size
    }

    /// How many times the secret has been read.
    pub fn secret_reads(&self) -> usize {
        self.secret_reads
    }

    /// The most recent touch, if any.
    pub fn last_touch(&self) -> Option<Touch> {
        self.last_touch
    }

    /// The access function with its explicit bounds branch.
    ///
    /// In bounds: read `secret[index]` and touch that value's page.
    /// Out of bounds: never read the secret; touch the default page.
    pub fn access(&mut self, index: usize) -> Touch {
        let touch = if index < self.secret.len() {
            let value = black_box(self.secret[index]);
            self.secret_reads += 1;
            Touch {
                page: value as usize,
                path: AccessPath::InBounds,
            }
        } else {
            Touch {
                page: self.default_page,
                path: AccessPath::Fallback,
            }
        };

        // page < 256 <= pages, so the offset is inside the arena
        black_box(self.probe.load(self.page_offset(touch.page)));
        self.last_touch = Some(touch);
        touch
    }

    /// Invoke the in-bounds path `rounds` times with `index`.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `index` is not inside the secret.
    pub fn train(&mut self, index: usize, rounds: usize) -> Result<()> {
        if index >= self.secret.len() {
            return Err(ProbeError::OutOfRange {
                index,
                len: self.secret.len(),
            });
        }
        for _ in 0..rounds {
            self.access(index);
        }
        Ok(())
    }

    /// Zero the first byte of every probe page.
    pub fn clear_pages(&mut self) -> Result<()> {
        for page in 0..self.pages {
            self.probe.write(self.page_offset(page), 0)?;
        }
        Ok(())
    }

    /// Time one read at the start of every probe page, in page order.
    pub fn measure_pages<C: Clock + ?Sized>(&self, clock: &mut C) -> Result<Vec<(usize, u64)>> {
        (0..self.pages)
            .map(|page| {
                let read = timed_read(&self.probe, self.page_offset(page), clock)?;
                Ok((page, read.duration_ns))
            })
            .collect()
    }
}

/// Outcome of leaking one index.
#[derive(Debug, Clone)]
pub struct LeakOutcome {
    /// Index that was queried.
    pub query_index: usize,
    /// Branch the query took.
    pub touch: Touch,
    /// All pages, fastest first.
    pub ranking: Vec<Ranked>,
    /// Every page timing, grouped by page.
    pub samples: SampleCollection,
}

impl LeakOutcome {
    /// Fastest page, read as a byte value.
    pub fn inferred(&self) -> Option<u8> {
        self.ranking
            .first()
            .and_then(|r| u8::try_from(r.location).ok())
    }
}

/// Run context for the simulation: simulator, eviction buffer, configuration.
#[derive(Debug)]
pub struct SpectreSimulation {
    config: SimulationConfig,
    simulator: SecretSimulator,
    evictor: Evictor,
}

impl SpectreSimulation {
    /// Simulation over `secret` with default configuration.
    pub fn new(secret: &[u8]) -> Result<Self> {
        Self::with_config(secret, SimulationConfig::default())
    }

    /// Simulation over `secret` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// `OutOfRange` for an invalid page layout, a zero eviction size or
    /// stride, or a `training_index` outside the secret.
    pub fn with_config(secret: &[u8], config: SimulationConfig) -> Result<Self> {
        let simulator = SecretSimulator::from_config(secret, &config)?;
        if config.training_index >= simulator.secret_len() {
            return Err(ProbeError::OutOfRange {
                index: config.training_index,
                len: simulator.secret_len(),
            });
        }
        let evictor = Evictor::new(config.eviction_size, config.eviction_stride)?;
        Ok(Self {
            config,
            simulator,
            evictor,
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The underlying simulator, for instrumentation.
    pub fn simulator(&self) -> &SecretSimulator {
        &self.simulator
    }

    /// Train, then clear → evict → invoke → measure for `query_index`.
    ///
    /// Repeats `config.rounds` times; each page is ranked by the median of
    /// its timings (the raw timing when there is one round).
    pub fn leak<C: Clock + ?Sized>(&mut self, query_index: usize, clock: &mut C) -> Result<LeakOutcome> {
        let pages: Vec<usize> = (0..self.simulator.pages()).collect();
        let mut samples = SampleCollection::new(&pages);
        let mut touch = None;

        for _ in 0..self.config.rounds.max(1) {
            self.simulator
                .train(self.config.training_index, self.config.training_rounds)?;
            self.simulator.clear_pages()?;
            self.evictor.evict();

            touch = Some(self.simulator.access(query_index));

            for (page, ns) in self.simulator.measure_pages(clock)? {
                samples.push(page, ns)?;
            }
        }

        let summaries = aggregate_collection(&samples)?;
        let touch = touch.ok_or(ProbeError::DegenerateSample { location: None })?;

        Ok(LeakOutcome {
            query_index,
            touch,
            ranking: rank_by_median(&summaries),
            samples,
        })
    }

    /// Leak every index of the secret in turn and return the inferred bytes.
    ///
    /// An entry is `None` when the fastest page is not a byte value (only
    /// possible with more than 256 probe pages).
    pub fn recover_secret<C: Clock + ?Sized>(&mut self, clock: &mut C) -> Result<Vec<Option<u8>>> {
        (0..self.simulator.secret_len())
            .map(|index| Ok(self.leak(index, clock)?.inferred()))
            .collect()
    }

    /// Build the clock from the configuration and leak `query_index`.
    pub fn run(&mut self, query_index: usize) -> Result<SimulationReport> {
        let mut clock = self.config.clock.build()?;
        self.run_with_clock(query_index, &mut clock)
    }

    /// Leak `query_index` with a caller-supplied clock and build the report.
    pub fn run_with_clock<C: Clock + ?Sized>(
        &mut self,
        query_index: usize,
        clock: &mut C,
    ) -> Result<SimulationReport> {
        let start = Instant::now();
        let outcome = self.leak(query_index, clock)?;

        let all: Vec<u64> = outcome
            .samples
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

        let expected = self.simulator.expected(query_index);
        let inferred = outcome.inferred();
        let top = outcome
            .ranking
            .iter()
            .take(self.config.top_n)
            .map(|r| RankedPage::new(r.location, r.time_ns))
            .collect();

        Ok(SimulationReport {
            query_index,
            secret_len: self.simulator.secret_len(),
            path: outcome.touch.path,
            touched_page: outcome.touch.page,
            top,
            expected_byte: expected,
            inferred_byte: inferred,
            recovered: expected.map(|e| Some(e) == inferred),
            rounds: self.config.rounds.max(1),
            warnings,
            metadata: Metadata {
                clock: clock.name().to_string(),
                clock_resolution_ns: clock.resolution_ns(),
                seed: None,
                runtime_secs: start.elapsed().as_secs_f64(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::PAGE_SIZE;
    use crate::measurement::ScriptedClock;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            eviction_size: 1 << 16,
            training_rounds: 10,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_valid_path_maps_value_to_page() {
        let mut sim = SecretSimulator::new(b"AB", 256, PAGE_SIZE, 0).unwrap();
        let touch = sim.access(1);
        assert_eq!(touch, Touch { page: 66, path: AccessPath::InBounds });
        assert_eq!(sim.secret_reads(), 1);
        assert_eq!(sim.page_offset(66), 66 * PAGE_SIZE);
    }

    #[test]
    fn test_invalid_path_never_reads_secret() {
        let mut sim = SecretSimulator::new(b"AB", 256, PAGE_SIZE, 0).unwrap();
        for index in [2, 99, usize::MAX] {
            let touch = sim.access(index);
            assert_eq!(touch, Touch { page: 0, path: AccessPath::Fallback });
        }
        assert_eq!(sim.secret_reads(), 0);
        assert_eq!(sim.last_touch().unwrap().page, 0);
    }

    #[test]
    fn test_train_reads_secret_each_round() {
        let mut sim = SecretSimulator::new(b"AB", 256, PAGE_SIZE, 0).unwrap();
        sim.train(0, 200).unwrap();
        assert_eq!(sim.secret_reads(), 200);
        assert_eq!(sim.last_touch().unwrap().page, 65);
        assert!(sim.train(2, 1).is_err());
    }

    #[test]
    fn test_construction_rejects_bad_layouts() {
        assert!(SecretSimulator::new(b"", 256, PAGE_SIZE, 0).is_err());
        assert!(SecretSimulator::new(b"x", 255, PAGE_SIZE, 0).is_err());
        assert!(SecretSimulator::new(b"x", 256, 0, 0).is_err());
        assert!(SecretSimulator::new(b"x", 256, PAGE_SIZE, 256).is_err());
    }

    #[test]
    fn test_leak_measures_every_page() {
        let mut sim = SpectreSimulation::with_config(b"AB", small_config()).unwrap();
        let mut clock = ScriptedClock::ticking(5);
        let outcome = sim.leak(1, &mut clock).unwrap();

        assert_eq!(outcome.ranking.len(), 256);
        assert_eq!(outcome.touch.page, 66);
        assert_eq!(clock.reads(), 2 * 256);
        // Scripted clock gives every page the same time; ties keep page order
        assert_eq!(outcome.ranking[0].location, 0);
    }

    #[test]
    fn test_leak_rounds_accumulate() {
        let config = SimulationConfig {
            rounds: 3,
            ..small_config()
        };
        let mut sim = SpectreSimulation::with_config(b"AB", config).unwrap();
        let outcome = sim.leak(0, &mut ScriptedClock::ticking(1)).unwrap();
        assert!(outcome.samples.iter().all(|(_, s)| s.len() == 3));
        // 3 rounds of 10 training reads plus one query each
        assert_eq!(sim.simulator().secret_reads(), 33);
    }

    #[test]
    fn test_training_index_validated_up_front() {
        let config = SimulationConfig {
            training_index: 2,
            ..small_config()
        };
        assert_eq!(
            SpectreSimulation::with_config(b"AB", config).unwrap_err(),
            ProbeError::OutOfRange { index: 2, len: 2 }
        );

        let config = SimulationConfig {
            training_index: 1,
            ..small_config()
        };
        assert!(SpectreSimulation::with_config(b"AB", config).is_ok());
    }

    /// Readings that give every page `slow` ns except `fast_page`, in page order.
    fn readings_with_fast_page(pages: usize, fast_page: usize, slow: u64, fast: u64) -> Vec<u64> {
        let mut readings = Vec::with_capacity(2 * pages);
        let mut t = 0;
        for page in 0..pages {
            readings.push(t);
            t += if page == fast_page { fast } else { slow };
            readings.push(t);
        }
        readings
    }

    #[test]
    fn test_recover_secret_infers_fastest_page() {
        let mut sim = SpectreSimulation::with_config(b"A", small_config()).unwrap();
        let mut clock = ScriptedClock::new(readings_with_fast_page(256, 65, 200, 40));
        assert_eq!(sim.recover_secret(&mut clock).unwrap(), vec![Some(b'A')]);
    }

    #[test]
    fn test_recover_secret_reports_unmappable_page() {
        let config = SimulationConfig {
            pages: 512,
            ..small_config()
        };
        let mut sim = SpectreSimulation::with_config(b"A", config).unwrap();
        let mut clock = ScriptedClock::new(readings_with_fast_page(512, 300, 200, 40));

        let recovered = sim.recover_secret(&mut clock).unwrap();
        assert_eq!(recovered, vec![None]);
    }

    #[test]
    fn test_out_of_bounds_run_reports_fallback() {
        let mut sim = SpectreSimulation::with_config(b"AB", small_config()).unwrap();
        let reads_before = sim.simulator().secret_reads();
        let report = sim.run_with_clock(99, &mut ScriptedClock::ticking(1)).unwrap();

        assert_eq!(report.path, AccessPath::Fallback);
        assert_eq!(report.touched_page, 0);
        assert_eq!(report.expected_byte, None);
        assert_eq!(report.recovered, None);
        // Only training touched the secret
        assert_eq!(sim.simulator().secret_reads() - reads_before, 10);
    }
}
