//! Repeated sampling with randomized measurement order.
//!
//! Every trial resets ambient cache state, optionally warms one target,
//! then times each candidate index in a fresh random order. Shuffling per
//! trial keeps a fixed scan order from correlating with:
//! - Hardware prefetchers that learn the scan direction
//! - Systematic first-read / last-read effects
//! - Slow drift (frequency scaling, interrupts) across the trial

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::arena::ProbeArena;
use crate::cache::{warm, Evictor};
use crate::error::{ProbeError, Result};
use crate::measurement::{measure_batched, timed_read, Clock};

/// Timings grouped by location, in candidate order.
///
/// Only grows: samples are appended and never rewritten.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleCollection {
    locations: Vec<usize>,
    samples: Vec<Vec<u64>>,
    orders: Vec<Vec<usize>>,
}

impl SampleCollection {
    /// Empty collection for `locations`. Duplicates keep their first position.
    pub fn new(locations: &[usize]) -> Self {
        let mut unique: Vec<usize> = Vec::with_capacity(locations.len());
        for &loc in locations {
            if !unique.contains(&loc) {
                unique.push(loc);
            }
        }
        let samples = vec![Vec::new(); unique.len()];
        Self {
            locations: unique,
            samples,
            orders: Vec::new(),
        }
    }

    /// Append one timing to `location`.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `location` is not part of this collection.
    pub fn push(&mut self, location: usize, duration_ns: u64) -> Result<()> {
        let slot = self.slot(location)?;
        self.samples[slot].push(duration_ns);
        Ok(())
    }

    /// Samples for `location`, if it belongs to the collection.
    pub fn get(&self, location: usize) -> Option<&[u64]> {
        self.slot(location).ok().map(|i| self.samples[i].as_slice())
    }

    /// Locations in candidate order.
    pub fn locations(&self) -> &[usize] {
        &self.locations
    }

    /// Iterate `(location, samples)` in candidate order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[u64])> + '_ {
        self.locations
            .iter()
            .copied()
            .zip(self.samples.iter().map(Vec::as_slice))
    }

    /// Number of locations.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// True when there are no locations.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Total samples across all locations.
    pub fn total_samples(&self) -> usize {
        self.samples.iter().map(Vec::len).sum()
    }

    /// Per-trial measurement orders, if they were recorded.
    pub fn orders(&self) -> &[Vec<usize>] {
        &self.orders
    }

    fn record_order(&mut self, order: Vec<usize>) {
        self.orders.push(order);
    }

    fn slot(&self, location: usize) -> Result<usize> {
        self.locations
            .iter()
            .position(|&l| l == location)
            .ok_or(ProbeError::OutOfRange {
                index: location,
                len: self.locations.len(),
            })
    }
}

/// What a sampling run measures.
#[derive(Debug, Clone, Copy)]
pub struct SamplingPlan<'a> {
    /// Candidate arena offsets, measured every trial.
    pub indices: &'a [usize],
    /// Number of trials.
    pub trials: usize,
    /// Index warmed after eviction in every trial, if any.
    pub target: Option<usize>,
    /// Reads per warming.
    pub warm_repetitions: usize,
}

/// Drives trials with a run-scoped, seedable RNG.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: Xoshiro256PlusPlus,
    seed: u64,
    record_orders: bool,
}

impl Sampler {
    /// Sampler with a fixed seed, for reproducible orders.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            seed,
            record_orders: false,
        }
    }

    /// Sampler seeded from the thread RNG.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// Keep each trial's measurement order in the collection.
    pub fn record_orders(mut self, record: bool) -> Self {
        self.record_orders = record;
        self
    }

    /// The seed this sampler was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A uniformly random permutation of `indices`.
    pub fn permute(&mut self, indices: &[usize]) -> Vec<usize> {
        let mut order = indices.to_vec();
        order.shuffle(&mut self.rng);
        order
    }

    /// Run `plan.trials` trials of evict → warm → measure.
    ///
    /// All indices (and the target) are validated before the first trial.
    ///
    /// # Errors
    ///
    /// - `OutOfRange` for any index outside the arena
    /// - `DegenerateSample` if `plan.trials` is zero or no indices are given
    /// - `ClockUnavailable` from the clock; the run stops there
    pub fn sample<C: Clock + ?Sized>(
        &mut self,
        arena: &ProbeArena,
        evictor: &Evictor,
        plan: &SamplingPlan<'_>,
        clock: &mut C,
    ) -> Result<SampleCollection> {
        validate(arena, plan.indices, plan.target)?;
        if plan.trials == 0 || plan.indices.is_empty() {
            return Err(ProbeError::DegenerateSample { location: None });
        }

        let mut steps = CacheSteps {
            arena,
            evictor,
            clock,
        };
        self.run_trials(&mut steps, plan)
    }

    /// Trial loop over any step implementation: evict, warm the target,
    /// then time every candidate in a fresh random order.
    fn run_trials<S: TrialSteps + ?Sized>(
        &mut self,
        steps: &mut S,
        plan: &SamplingPlan<'_>,
    ) -> Result<SampleCollection> {
        let mut collection = SampleCollection::new(plan.indices);
        let candidates = collection.locations().to_vec();

        for _ in 0..plan.trials {
            steps.evict();
            if let Some(target) = plan.target {
                steps.warm(target, plan.warm_repetitions)?;
            }

            let order = self.permute(&candidates);
            for &index in &order {
                let duration_ns = steps.time(index)?;
                collection.push(index, duration_ns)?;
            }

            if self.record_orders {
                collection.record_order(order);
            }
        }

        Ok(collection)
    }

    /// Simple batched experiment: evict, warm once, then time
    /// `iterations` reads per index in candidate order.
    ///
    /// Returns the per-read average for each index. Order is not
    /// randomized: this reproduces the naive scan so its bias can be
    /// compared against [`Sampler::sample`].
    pub fn sample_batched<C: Clock + ?Sized>(
        &mut self,
        arena: &ProbeArena,
        evictor: &Evictor,
        plan: &SamplingPlan<'_>,
        iterations: usize,
        clock: &mut C,
    ) -> Result<Vec<(usize, f64)>> {
        validate(arena, plan.indices, plan.target)?;
        if plan.indices.is_empty() {
            return Err(ProbeError::DegenerateSample { location: None });
        }

        evictor.evict();
        if let Some(target) = plan.target {
            warm(arena, target, plan.warm_repetitions)?;
        }

        let candidates = SampleCollection::new(plan.indices).locations().to_vec();
        candidates
            .into_iter()
            .map(|index| Ok((index, measure_batched(arena, index, iterations, clock)?)))
            .collect()
    }
}

/// The operations one trial is made of.
trait TrialSteps {
    fn evict(&mut self);
    fn warm(&mut self, index: usize, repetitions: usize) -> Result<()>;
    fn time(&mut self, index: usize) -> Result<u64>;
}

/// Trial steps against a real arena, eviction buffer and clock.
struct CacheSteps<'a, C: ?Sized> {
    arena: &'a ProbeArena,
    evictor: &'a Evictor,
    clock: &'a mut C,
}

impl<C: Clock + ?Sized> TrialSteps for CacheSteps<'_, C> {
    fn evict(&mut self) {
        self.evictor.evict();
    }

    fn warm(&mut self, index: usize, repetitions: usize) -> Result<()> {
        warm(self.arena, index, repetitions)
    }

    fn time(&mut self, index: usize) -> Result<u64> {
        Ok(timed_read(self.arena, index, self.clock)?.duration_ns)
    }
}

fn validate(arena: &ProbeArena, indices: &[usize], target: Option<usize>) -> Result<()> {
    for &index in indices {
        arena.check(index)?;
    }
    if let Some(target) = target {
        arena.check(target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::ScriptedClock;
    use crate::statistics::{chi_square_uniform, position_counts};

    fn fixture() -> (ProbeArena, Evictor) {
        (
            ProbeArena::create(1 << 16).unwrap(),
            Evictor::new(1 << 14, 64).unwrap(),
        )
    }

    #[test]
    fn test_collection_push_and_get() {
        let mut c = SampleCollection::new(&[5, 9, 5]);
        assert_eq!(c.locations(), &[5, 9]);
        c.push(9, 3).unwrap();
        c.push(9, 4).unwrap();
        assert_eq!(c.get(9), Some(&[3, 4][..]));
        assert_eq!(c.get(5), Some(&[][..]));
        assert_eq!(c.get(1), None);
        assert!(c.push(1, 0).is_err());
        assert_eq!(c.total_samples(), 2);
    }

    #[test]
    fn test_sample_counts() {
        let (arena, evictor) = fixture();
        let indices = [0, 100, 1000, 65535];
        let plan = SamplingPlan {
            indices: &indices,
            trials: 25,
            target: Some(1000),
            warm_repetitions: 10,
        };
        let mut clock = ScriptedClock::ticking(3);
        let collection = Sampler::new(1)
            .sample(&arena, &evictor, &plan, &mut clock)
            .unwrap();

        for (_, samples) in collection.iter() {
            assert_eq!(samples.len(), 25);
            // Each timed read spans exactly one tick of the scripted clock
            assert!(samples.iter().all(|&s| s == 3));
        }
        // Two readings per timed read, nothing else touches the clock
        assert_eq!(clock.reads(), 2 * 25 * indices.len());
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Evict,
        Warm(usize),
        Time(usize),
    }

    #[derive(Default)]
    struct RecordingSteps {
        log: Vec<Step>,
    }

    impl TrialSteps for RecordingSteps {
        fn evict(&mut self) {
            self.log.push(Step::Evict);
        }

        fn warm(&mut self, index: usize, _repetitions: usize) -> Result<()> {
            self.log.push(Step::Warm(index));
            Ok(())
        }

        fn time(&mut self, index: usize) -> Result<u64> {
            self.log.push(Step::Time(index));
            Ok(1)
        }
    }

    #[test]
    fn test_trial_evicts_then_warms_then_times() {
        let indices = [0, 100, 1000, 65535];
        let plan = SamplingPlan {
            indices: &indices,
            trials: 20,
            target: Some(1000),
            warm_repetitions: 10,
        };
        let mut steps = RecordingSteps::default();
        Sampler::new(5).run_trials(&mut steps, &plan).unwrap();

        assert_eq!(steps.log.len(), 20 * (2 + indices.len()));
        for trial in steps.log.chunks(2 + indices.len()) {
            assert_eq!(trial[0], Step::Evict);
            assert_eq!(trial[1], Step::Warm(1000));
            let mut timed: Vec<usize> = trial[2..]
                .iter()
                .map(|step| match step {
                    Step::Time(index) => *index,
                    other => panic!("expected a timed read, got {:?}", other),
                })
                .collect();
            timed.sort_unstable();
            assert_eq!(timed, indices);
        }
    }

    #[test]
    fn test_trial_without_target_skips_warm() {
        let plan = SamplingPlan {
            indices: &[3, 4],
            trials: 5,
            target: None,
            warm_repetitions: 10,
        };
        let mut steps = RecordingSteps::default();
        Sampler::new(5).run_trials(&mut steps, &plan).unwrap();

        for trial in steps.log.chunks(3) {
            assert_eq!(trial[0], Step::Evict);
            assert!(matches!(trial[1], Step::Time(_)));
            assert!(matches!(trial[2], Step::Time(_)));
        }
    }

    #[test]
    fn test_zero_trials_is_degenerate() {
        let (arena, evictor) = fixture();
        let plan = SamplingPlan {
            indices: &[0, 1],
            trials: 0,
            target: None,
            warm_repetitions: 0,
        };
        let err = Sampler::new(0)
            .sample(&arena, &evictor, &plan, &mut ScriptedClock::ticking(1))
            .unwrap_err();
        assert_eq!(err, ProbeError::DegenerateSample { location: None });
    }

    #[test]
    fn test_out_of_range_detected_before_any_trial() {
        let (arena, evictor) = fixture();
        let plan = SamplingPlan {
            indices: &[0, 1 << 16],
            trials: 10,
            target: None,
            warm_repetitions: 0,
        };
        let mut clock = ScriptedClock::ticking(1);
        let err = Sampler::new(0)
            .sample(&arena, &evictor, &plan, &mut clock)
            .unwrap_err();
        assert_eq!(err, ProbeError::OutOfRange { index: 1 << 16, len: 1 << 16 });
        assert_eq!(clock.reads(), 0);

        let plan = SamplingPlan {
            indices: &[0],
            trials: 10,
            target: Some(usize::MAX),
            warm_repetitions: 1,
        };
        assert!(Sampler::new(0)
            .sample(&arena, &evictor, &plan, &mut clock)
            .is_err());
    }

    #[test]
    fn test_clock_failure_stops_run() {
        let (arena, evictor) = fixture();
        let plan = SamplingPlan {
            indices: &[0, 1, 2],
            trials: 5,
            target: None,
            warm_repetitions: 0,
        };
        let mut clock = ScriptedClock::new(vec![0, 1, 2, 3]);
        assert!(matches!(
            Sampler::new(0).sample(&arena, &evictor, &plan, &mut clock),
            Err(ProbeError::ClockUnavailable(_))
        ));
    }

    #[test]
    fn test_same_seed_same_orders() {
        let indices: Vec<usize> = (0..8).collect();
        let mut a = Sampler::new(99);
        let mut b = Sampler::new(99);
        for _ in 0..20 {
            assert_eq!(a.permute(&indices), b.permute(&indices));
        }
    }

    #[test]
    fn test_permutation_is_permutation() {
        let indices = [3, 1, 4, 15, 9, 26];
        let mut sampler = Sampler::new(7);
        let mut order = sampler.permute(&indices);
        order.sort_unstable();
        assert_eq!(order, vec![1, 3, 4, 9, 15, 26]);
    }

    #[test]
    fn test_order_positions_uniform() {
        let (arena, evictor) = fixture();
        let indices = [0, 16384, 32768, 49152, 65535];
        let plan = SamplingPlan {
            indices: &indices,
            trials: 5000,
            target: None,
            warm_repetitions: 0,
        };
        let collection = Sampler::new(2024)
            .record_orders(true)
            .sample(&arena, &evictor, &plan, &mut ScriptedClock::ticking(1))
            .unwrap();
        assert_eq!(collection.orders().len(), 5000);

        let counts = position_counts(collection.orders(), &indices);
        for row in &counts {
            // 4 degrees of freedom; 30 is far beyond the 0.001 critical value (18.47)
            let chi2 = chi_square_uniform(row);
            assert!(chi2 < 30.0, "position counts {:?} chi2 = {}", row, chi2);
        }
    }

    #[test]
    fn test_sample_batched() {
        let (arena, evictor) = fixture();
        let plan = SamplingPlan {
            indices: &[10, 20, 30],
            trials: 1,
            target: Some(20),
            warm_repetitions: 100,
        };
        let mut clock = ScriptedClock::ticking(500);
        let averages = Sampler::new(0)
            .sample_batched(&arena, &evictor, &plan, 100, &mut clock)
            .unwrap();
        assert_eq!(averages.len(), 3);
        assert_eq!(averages[0].0, 10);
        assert!(averages.iter().all(|&(_, ns)| (ns - 5.0).abs() < 1e-12));
    }
}
