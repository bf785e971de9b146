//! # cache-probe
//!
//! Observe CPU cache timing side channels on memory you own.
//!
//! This crate measures how long single memory reads take and shows that
//! reads of recently touched ("warm") locations complete faster than reads
//! of evicted ("cold") ones:
//! - Warm/cold experiments with randomized, repeated sampling
//! - Median / mean / population standard deviation per location
//! - A sandboxed Spectre-style simulation that recovers a local secret byte
//!   from probe-page timings, without any out-of-bounds read
//!
//! Timing relationships are statistical. A single run on a noisy machine
//! can rank a cold location first; repeat runs and compare medians.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cache_probe::{output, CacheProbe, SpectreSimulation};
//!
//! let report = CacheProbe::new().trials(200).run()?;
//! println!("{}", output::format_experiment(&report));
//!
//! let mut sim = SpectreSimulation::new(b"password123")?;
//! let leak = sim.run(0)?;
//! println!("{}", output::format_simulation(&leak));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod config;
mod error;
mod probe;
mod result;

// Functional modules
pub mod arena;
pub mod cache;
pub mod measurement;
pub mod output;
pub mod preflight;
pub mod rank;
pub mod sampling;
pub mod simulator;
pub mod statistics;

// Re-exports for public API
pub use arena::ProbeArena;
pub use config::{spanning_indices, Config, SimulationConfig, WarmTarget};
pub use error::{ProbeError, Result};
pub use measurement::{Clock, ClockSpec};
pub use probe::CacheProbe;
pub use result::{
    BatchedReport, ExperimentReport, LocationReport, Metadata, RankedPage, SimulationReport,
};
pub use simulator::{AccessPath, SecretSimulator, SpectreSimulation};

/// Run the default sampled warm/cold experiment.
///
/// Equivalent to `CacheProbe::new().run()`.
pub fn probe() -> Result<ExperimentReport> {
    CacheProbe::new().run()
}

/// Simulate leaking byte `index` of a local `secret` with default settings.
pub fn simulate_leak(secret: &[u8], index: usize) -> Result<SimulationReport> {
    SpectreSimulation::new(secret)?.run(index)
}
