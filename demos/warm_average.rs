//! Batched warm/cold comparison.
//!
//! Warms the middle of a 5,000,000-byte arena once, then times 100
//! back-to-back reads of each candidate offset in a single window. The
//! warmed offset should show the lowest average on most runs.

use cache_probe::{output, CacheProbe};

fn main() -> cache_probe::Result<()> {
    let report = CacheProbe::new()
        .from_env()
        .arena_size(5_000_000)
        .warm_repetitions(1000)
        .batch_iterations(100)
        .run_batched()?;

    println!("{}", output::format_batched(&report));
    if !report.target_is_fastest() {
        println!("Warmed offset was not fastest this run; timing is noisy, try again.");
    }
    Ok(())
}
