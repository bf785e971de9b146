//! Sandboxed Spectre-style leak of a local secret.
//!
//! Nothing here reads out of bounds: the in-bounds branch is executed
//! for real and the probe page it touches is found by timing all 256
//! pages. Pass a query index as the first argument (default 0); an index
//! past the end of the secret takes the fallback branch.

use cache_probe::{output, SimulationConfig, SpectreSimulation};

fn main() -> cache_probe::Result<()> {
    let index = std::env::args()
        .nth(1)
        .and_then(|a| a.parse::<usize>().ok())
        .unwrap_or(0);

    let mut sim = SpectreSimulation::with_config(b"password123", SimulationConfig::voted(5))?;
    let report = sim.run(index)?;
    println!("{}", output::format_simulation(&report));
    Ok(())
}
