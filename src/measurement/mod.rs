//! Measurement infrastructure.
//!
//! This module provides:
//! - An injectable [`Clock`] trait with real and scripted implementations
//! - The timed access primitive ([`timed_read`]) and its batched variant
//!
//! # Clock Selection
//!
//! [`ClockSpec::Auto`] uses the serialized cycle counter on x86_64 (`lfence;
//! rdtsc`, sub-nanosecond resolution) and `std::time::Instant` elsewhere.
//! On Apple Silicon the cycle counter only ticks at 24 MHz (~41 ns), which
//! is too coarse to resolve a cache hit, so `Instant` is preferred there and
//! the batched variant is the better tool.

mod clock;
mod timed;

pub use clock::{
    cycles_per_ns, rdtsc, BoxedClock, Clock, ClockSpec, CycleClock, MonotonicClock, ScriptedClock,
};
pub use timed::{measure_batched, timed_read, TimedRead};
