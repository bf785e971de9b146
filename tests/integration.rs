//! End-to-end integration tests.

use cache_probe::measurement::ScriptedClock;
use cache_probe::{output, CacheProbe, ClockSpec, Config, ProbeError, SpectreSimulation};

/// Basic smoke test that a real-clock run completes.
#[test]
fn smoke_test() {
    let report = CacheProbe::new()
        .arena_size(1 << 20)
        .eviction(1 << 18, 64)
        .trials(20)
        .warm_repetitions(100)
        .seed(1)
        .quiet()
        .run()
        .expect("run should complete");

    assert_eq!(report.locations.len(), 5);
    assert_eq!(report.ranking.len(), 5);
    for row in &report.locations {
        assert_eq!(row.summary.count, 20);
        assert!(row.summary.min_ns as f64 <= row.summary.median_ns);
        assert!(row.summary.median_ns <= row.summary.max_ns as f64);
        assert!(row.summary.stdev_ns >= 0.0);
    }
}

/// Builder values end up in the configuration.
#[test]
fn builder_api() {
    let probe = CacheProbe::new()
        .arena_size(5_000_000)
        .trials(150)
        .warm_repetitions(1000)
        .eviction(2_500_000, 4096)
        .clock_spec(ClockSpec::Monotonic)
        .seed(11);

    let config = probe.config();
    assert_eq!(config.arena_size, 5_000_000);
    assert_eq!(config.trials, 150);
    assert_eq!(config.warm_repetitions, 1000);
    assert_eq!(config.effective_eviction_size(), 2_500_000);
    assert_eq!(config.clock, ClockSpec::Monotonic);
    assert_eq!(
        config.candidate_indices(),
        vec![0, 1_250_000, 2_500_000, 3_750_000, 4_999_999]
    );
}

/// The same seed reproduces the same report shape under a scripted clock.
#[test]
fn seeded_runs_are_reproducible() {
    let probe = CacheProbe::with_config(Config::quick())
        .arena_size(1 << 16)
        .eviction(1 << 12, 64)
        .seed(77)
        .quiet();

    let a = probe.run_with_clock(&mut ScriptedClock::ticking(3)).unwrap();
    let b = probe.run_with_clock(&mut ScriptedClock::ticking(3)).unwrap();

    let medians = |r: &cache_probe::ExperimentReport| {
        r.locations
            .iter()
            .map(|l| l.summary.median_ns)
            .collect::<Vec<_>>()
    };
    assert_eq!(medians(&a), medians(&b));
    assert_eq!(a.metadata.seed, Some(77));
}

/// A clock that stops producing readings aborts the run.
#[test]
fn clock_failure_is_fatal() {
    let err = CacheProbe::new()
        .arena_size(1 << 16)
        .eviction(1 << 12, 64)
        .trials(10)
        .quiet()
        .run_with_clock(&mut ScriptedClock::new(vec![0, 1, 2]))
        .unwrap_err();
    assert!(matches!(err, ProbeError::ClockUnavailable(_)));
}

/// Reports render and serialize.
#[test]
fn report_output() {
    let report = CacheProbe::new()
        .arena_size(1 << 16)
        .eviction(1 << 12, 64)
        .trials(10)
        .seed(5)
        .quiet()
        .run_with_clock(&mut ScriptedClock::ticking(2))
        .unwrap();

    let text = output::format_experiment(&report);
    assert!(text.contains("median"));
    assert!(text.contains("(warmed)"));

    let json = output::to_json(&report).expect("should serialize");
    assert!(json.contains("\"median_ns\""));
    assert!(json.contains("\"ranking\""));
}

/// The simulation runs end to end with a real clock.
#[test]
fn simulation_smoke() {
    let mut sim = SpectreSimulation::with_config(
        b"password123",
        cache_probe::SimulationConfig {
            eviction_size: 1 << 20,
            quiet: true,
            ..Default::default()
        },
    )
    .unwrap();

    let report = sim.run(0).unwrap();
    assert_eq!(report.expected_byte, Some(b'p'));
    assert_eq!(report.touched_page, b'p' as usize);
    assert_eq!(report.top.len(), 6);
    assert!(report.inferred_byte.is_some());

    let text = output::format_simulation(&report);
    assert!(text.contains("is 112 ('p')"));
}
