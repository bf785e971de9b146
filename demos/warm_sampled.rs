//! Sampled warm/cold comparison.
//!
//! Each trial evicts the eviction buffer, warms the middle offset, then
//! reads every candidate once in a fresh random order. Reports the median,
//! mean and standard deviation per offset.
//!
//! Set `CP_TRIALS`, `CP_SEED`, `CP_EVICT_STRIDE` etc. to override defaults.
//! Pass `--json` to print the report as JSON instead.

use cache_probe::{output, CacheProbe};

fn main() -> cache_probe::Result<()> {
    let json = std::env::args().any(|a| a == "--json");

    let report = CacheProbe::new().trials(300).from_env().run()?;

    if json {
        match output::to_json_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("failed to serialize report: {}", e),
        }
    } else {
        println!("{}", output::format_experiment(&report));
    }
    Ok(())
}
