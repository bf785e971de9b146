//! Injectable clocks for timed reads.
//!
//! Provides:
//! - `MonotonicClock` - `std::time::Instant`, available everywhere
//! - `CycleClock` - serialized cycle counter (`lfence; rdtsc` / `isb; mrs cntvct_el0`)
//! - `ScriptedClock` - deterministic readings for tests
//! - `BoxedClock` / `ClockSpec` - enum dispatch over the real clocks

use std::sync::atomic::{compiler_fence, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

/// A monotonic source of nanosecond timestamps.
///
/// Readings never decrease under monotonic progression. Implementations
/// return `ClockUnavailable` when they cannot produce a reading.
pub trait Clock {
    /// Current timestamp in nanoseconds from an arbitrary origin.
    fn now_ns(&mut self) -> Result<u64>;

    /// Short name for reports.
    fn name(&self) -> &'static str;

    /// Estimated smallest observable difference between two readings.
    fn resolution_ns(&self) -> f64;
}

impl<C: Clock + ?Sized> Clock for &mut C {
    #[inline]
    fn now_ns(&mut self) -> Result<u64> {
        (**self).now_ns()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resolution_ns(&self) -> f64 {
        (**self).resolution_ns()
    }
}

/// Clock backed by `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    resolution_ns: f64,
}

impl MonotonicClock {
    /// Create a clock anchored at the current instant.
    pub fn new() -> Self {
        let origin = Instant::now();
        let resolution_ns = measure_resolution(|| origin.elapsed().as_nanos() as u64);
        Self {
            origin,
            resolution_ns,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ns(&mut self) -> Result<u64> {
        compiler_fence(Ordering::SeqCst);
        let ns = self.origin.elapsed().as_nanos() as u64;
        compiler_fence(Ordering::SeqCst);
        Ok(ns)
    }

    fn name(&self) -> &'static str {
        "Instant"
    }

    fn resolution_ns(&self) -> f64 {
        self.resolution_ns
    }
}

/// Read the CPU cycle counter with serialization.
///
/// Returns `None` on architectures without a supported counter.
#[inline]
pub fn rdtsc() -> Option<u64> {
    #[cfg(target_arch = "x86_64")]
    {
        Some(rdtsc_x86_64())
    }

    #[cfg(target_arch = "aarch64")]
    {
        Some(rdtsc_aarch64())
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        None
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn rdtsc_x86_64() -> u64 {
    compiler_fence(Ordering::SeqCst);

    let cycles: u64;
    // SAFETY: lfence and rdtsc have no memory operands and are always
    // available in 64-bit mode.
    unsafe {
        std::arch::asm!(
            "lfence",
            "rdtsc",
            "shl rdx, 32",
            "or rax, rdx",
            out("rax") cycles,
            out("rdx") _,
            options(nostack, nomem),
        );
    }

    compiler_fence(Ordering::SeqCst);
    cycles
}

#[cfg(target_arch = "aarch64")]
#[inline]
fn rdtsc_aarch64() -> u64 {
    compiler_fence(Ordering::SeqCst);

    let cycles: u64;
    // SAFETY: cntvct_el0 is readable from EL0 on every OS we target.
    unsafe {
        std::arch::asm!(
            "isb",
            "mrs {}, cntvct_el0",
            out(reg) cycles,
            options(nostack, nomem),
        );
    }

    compiler_fence(Ordering::SeqCst);
    cycles
}

/// Calibrate the cycle counter against wall-clock time.
///
/// Returns the median cycles-per-nanosecond ratio over several 1 ms sleeps.
///
/// # Errors
///
/// `ClockUnavailable` if there is no counter or no usable ratio was observed.
pub fn cycles_per_ns() -> Result<f64> {
    const CALIBRATION_MS: u64 = 1;
    const CALIBRATION_ITERATIONS: usize = 20;

    let mut ratios = Vec::with_capacity(CALIBRATION_ITERATIONS);

    for _ in 0..CALIBRATION_ITERATIONS {
        let start_cycles = rdtsc().ok_or_else(no_counter)?;
        let start_time = Instant::now();

        std::thread::sleep(Duration::from_millis(CALIBRATION_MS));

        let end_cycles = rdtsc().ok_or_else(no_counter)?;
        let elapsed_nanos = start_time.elapsed().as_nanos() as u64;

        if elapsed_nanos == 0 {
            continue;
        }

        let cycles = end_cycles.saturating_sub(start_cycles);
        let ratio = cycles as f64 / elapsed_nanos as f64;
        if ratio.is_finite() && ratio > 0.0 {
            ratios.push(ratio);
        }
    }

    if ratios.is_empty() {
        return Err(ProbeError::ClockUnavailable(
            "cycle counter did not advance during calibration".to_string(),
        ));
    }

    ratios.sort_by(|a, b| a.total_cmp(b));
    let mid = ratios.len() / 2;
    if ratios.len() % 2 == 0 {
        Ok((ratios[mid - 1] + ratios[mid]) / 2.0)
    } else {
        Ok(ratios[mid])
    }
}

fn no_counter() -> ProbeError {
    ProbeError::ClockUnavailable("no cycle counter on this architecture".to_string())
}

/// Minimum non-zero difference between back-to-back readings.
fn measure_resolution<F: FnMut() -> u64>(mut read: F) -> f64 {
    let mut min_diff = u64::MAX;

    for _ in 0..1000 {
        let t1 = read();
        let t2 = read();
        let diff = t2.saturating_sub(t1);
        if diff > 0 && diff < min_diff {
            min_diff = diff;
        }
    }

    if min_diff == u64::MAX {
        1.0
    } else {
        min_diff as f64
    }
}

/// Clock backed by the serialized CPU cycle counter.
///
/// Readings count cycles since construction, so the scaled value stays
/// small and exact to well under a nanosecond. On
/// Apple Silicon the virtual counter ticks at 24 MHz, so resolution is
/// about 41 ns; on x86_64 it is a fraction of a nanosecond.
#[derive(Debug, Clone)]
pub struct CycleClock {
    origin: u64,
    cycles_per_ns: f64,
    resolution_ns: f64,
}

impl CycleClock {
    /// Create a cycle clock with automatic calibration.
    pub fn new() -> Result<Self> {
        let cpn = cycles_per_ns()?;
        Self::with_cycles_per_ns(cpn)
    }

    /// Create a cycle clock with a known ratio.
    pub fn with_cycles_per_ns(cycles_per_ns: f64) -> Result<Self> {
        if !cycles_per_ns.is_finite() || cycles_per_ns <= 0.0 {
            return Err(ProbeError::ClockUnavailable(format!(
                "invalid cycles per ns: {}",
                cycles_per_ns
            )));
        }
        let ticks = measure_resolution(|| rdtsc().unwrap_or(0));
        let origin = rdtsc().ok_or_else(no_counter)?;
        Ok(Self {
            origin,
            cycles_per_ns,
            resolution_ns: (ticks / cycles_per_ns).max(1.0 / cycles_per_ns),
        })
    }

    /// Calibrated cycles per nanosecond.
    pub fn cycles_per_ns(&self) -> f64 {
        self.cycles_per_ns
    }
}

impl Clock for CycleClock {
    #[inline]
    fn now_ns(&mut self) -> Result<u64> {
        let cycles = rdtsc().ok_or_else(no_counter)?.saturating_sub(self.origin);
        Ok((cycles as f64 / self.cycles_per_ns) as u64)
    }

    fn name(&self) -> &'static str {
        #[cfg(target_arch = "aarch64")]
        {
            "cntvct_el0"
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            "rdtsc"
        }
    }

    fn resolution_ns(&self) -> f64 {
        self.resolution_ns
    }
}

/// Deterministic clock that replays a fixed sequence of readings.
///
/// Used to check control flow (how many readings a step takes, what
/// duration it reports) without depending on hardware jitter.
#[derive(Debug, Clone)]
pub struct ScriptedClock {
    readings: Vec<u64>,
    next: usize,
    step: Option<u64>,
}

impl ScriptedClock {
    /// Replay `readings` in order; further reads fail with `ClockUnavailable`.
    pub fn new(readings: Vec<u64>) -> Self {
        Self {
            readings,
            next: 0,
            step: None,
        }
    }

    /// Clock that starts at zero and advances by `step` on every read.
    pub fn ticking(step: u64) -> Self {
        Self {
            readings: Vec::new(),
            next: 0,
            step: Some(step),
        }
    }

    /// Number of readings taken so far.
    pub fn reads(&self) -> usize {
        self.next
    }
}

impl Clock for ScriptedClock {
    fn now_ns(&mut self) -> Result<u64> {
        let value = match self.step {
            Some(step) => step.saturating_mul(self.next as u64),
            None => *self.readings.get(self.next).ok_or_else(|| {
                ProbeError::ClockUnavailable(format!(
                    "scripted clock exhausted after {} readings",
                    self.readings.len()
                ))
            })?,
        };
        self.next += 1;
        Ok(value)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn resolution_ns(&self) -> f64 {
        self.step.map(|s| s as f64).unwrap_or(1.0)
    }
}

/// Which clock a run should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockSpec {
    /// Cycle counter on x86_64, monotonic clock elsewhere.
    ///
    /// Falls back to the monotonic clock if calibration fails.
    #[default]
    Auto,
    /// Always `std::time::Instant`.
    Monotonic,
    /// Always the cycle counter; fails if it cannot be calibrated.
    Cycle,
}

impl ClockSpec {
    /// Build the clock described by this spec.
    ///
    /// # Errors
    ///
    /// `ClockUnavailable` when `Cycle` was requested and calibration failed.
    pub fn build(self) -> Result<BoxedClock> {
        match self {
            ClockSpec::Monotonic => Ok(BoxedClock::Monotonic(MonotonicClock::new())),
            ClockSpec::Cycle => Ok(BoxedClock::Cycle(CycleClock::new()?)),
            ClockSpec::Auto => {
                if cfg!(target_arch = "x86_64") {
                    match CycleClock::new() {
                        Ok(clock) => return Ok(BoxedClock::Cycle(clock)),
                        Err(err) => {
                            eprintln!("[cache-probe] {}; falling back to Instant", err);
                        }
                    }
                }
                Ok(BoxedClock::Monotonic(MonotonicClock::new()))
            }
        }
    }
}

/// Any of the real clocks, selected at runtime.
#[derive(Debug, Clone)]
pub enum BoxedClock {
    /// `std::time::Instant`.
    Monotonic(MonotonicClock),
    /// Serialized cycle counter.
    Cycle(CycleClock),
}

impl Clock for BoxedClock {
    #[inline]
    fn now_ns(&mut self) -> Result<u64> {
        match self {
            BoxedClock::Monotonic(c) => c.now_ns(),
            BoxedClock::Cycle(c) => c.now_ns(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            BoxedClock::Monotonic(c) => c.name(),
            BoxedClock::Cycle(c) => c.name(),
        }
    }

    fn resolution_ns(&self) -> f64 {
        match self {
            BoxedClock::Monotonic(c) => c.resolution_ns(),
            BoxedClock::Cycle(c) => c.resolution_ns(),
        }
    }
}
