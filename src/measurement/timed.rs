//! The timed access primitive.

use std::hint::black_box;

use serde::{Deserialize, Serialize};

use crate::arena::ProbeArena;
use crate::error::{ProbeError, Result};

use super::clock::Clock;

/// Outcome of one timed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedRead {
    /// The byte that was read. Kept so the read cannot be optimized away.
    pub value: u8,
    /// Elapsed time between the two clock readings, in nanoseconds.
    pub duration_ns: u64,
}

/// Time exactly one read of `arena[index]`.
///
/// The index is validated before the first clock reading, so the timed
/// window holds nothing but the read. A clock that steps backwards yields a
/// duration of zero. Never retries.
///
/// # Errors
///
/// - `OutOfRange` if `index >= arena.len()` (no clock reading is taken)
/// - `ClockUnavailable` if either clock reading fails
#[inline]
pub fn timed_read<C: Clock + ?Sized>(
    arena: &ProbeArena,
    index: usize,
    clock: &mut C,
) -> Result<TimedRead> {
    arena.check(index)?;

    let start = clock.now_ns()?;
    let value = arena.load(index);
    let end = clock.now_ns()?;

    Ok(TimedRead {
        value: black_box(value),
        duration_ns: end.saturating_sub(start),
    })
}

/// Time `iterations` back-to-back reads of `arena[index]` in one window.
///
/// Returns the average nanoseconds per read. Useful when the clock is too
/// coarse to resolve a single access.
///
/// # Errors
///
/// - `OutOfRange` if `index >= arena.len()`
/// - `DegenerateSample` if `iterations == 0`
/// - `ClockUnavailable` if either clock reading fails
pub fn measure_batched<C: Clock + ?Sized>(
    arena: &ProbeArena,
    index: usize,
    iterations: usize,
    clock: &mut C,
) -> Result<f64> {
    arena.check(index)?;
    if iterations == 0 {
        return Err(ProbeError::DegenerateSample {
            location: Some(index),
        });
    }

    let start = clock.now_ns()?;
    for _ in 0..iterations {
        black_box(arena.load(index));
    }
    let end = clock.now_ns()?;

    Ok(end.saturating_sub(start) as f64 / iterations as f64)
}
