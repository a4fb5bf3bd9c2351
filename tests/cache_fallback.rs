//! Integration tests for the cache orchestrator
//!
//! Covers round trips in both modes, expiry, startup and per-call fallback,
//! clearing, re-probing, hand-over between tiers and the documented file-name
//! collision.

mod common;

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use common::{record, FakeRemote, T0};
use weather_cache::cache::{ManualClock, RedisBackend, StatsSnapshot};
use weather_cache::data::WeatherRecord;
use weather_cache::{BackendMode, CacheConfig, CacheOrchestrator, Lookup, Source, WriteOutcome};

const SCENARIO_KEY: &str = "historical_52.2297_21.0122_2024-01-01_2024-01-07";

struct Harness {
    cache: CacheOrchestrator<FakeRemote>,
    remote: FakeRemote,
    clock: Arc<ManualClock>,
    temp_dir: TempDir,
}

impl Harness {
    fn file_path(&self, key: &str) -> std::path::PathBuf {
        self.temp_dir.path().join(self.cache.key_codec().file_name(key))
    }
}

fn harness_with(reachable: bool, reprobe: Option<Duration>) -> Harness {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let clock = Arc::new(ManualClock::new(T0));
    let remote = FakeRemote::new(clock.clone(), reachable);

    let mut config = CacheConfig::default().with_cache_dir(temp_dir.path());
    if let Some(interval) = reprobe {
        config = config.with_reprobe_interval(interval);
    }
    let cache = CacheOrchestrator::from_parts(&config, Some(remote.clone()), clock.clone());

    Harness {
        cache,
        remote,
        clock,
        temp_dir,
    }
}

fn harness(reachable: bool) -> Harness {
    harness_with(reachable, None)
}

fn file_only_cache() -> (CacheOrchestrator, Arc<ManualClock>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let clock = Arc::new(ManualClock::new(T0));
    let cache =
        CacheOrchestrator::connect_with_clock(&CacheConfig::file_only(temp_dir.path()), clock.clone());
    (cache, clock, temp_dir)
}

#[test]
fn test_round_trip_in_remote_mode() {
    let h = harness(true);
    assert_eq!(h.cache.mode(), BackendMode::Remote);

    let outcome = h.cache.put("k", &record(1.0), 60);
    assert_eq!(outcome, WriteOutcome::Stored(Source::Primary));
    assert!(h.remote.contains("weather:k"), "Entry should be namespaced in the remote store");
    assert!(!h.file_path("k").exists(), "Healthy remote should not touch the file cache");

    let lookup = h.cache.get::<WeatherRecord>("k");
    assert_eq!(
        lookup,
        Lookup::Hit {
            value: record(1.0),
            source: Source::Primary
        }
    );
}

#[test]
fn test_round_trip_without_remote() {
    let (cache, _clock, temp_dir) = file_only_cache();
    assert_eq!(cache.mode(), BackendMode::FileOnly);

    assert_eq!(cache.put("k", &record(2.0), 60), WriteOutcome::Stored(Source::Primary));
    assert!(temp_dir.path().join("k.cache").exists());
    assert_eq!(cache.get::<WeatherRecord>("k").into_option(), Some(record(2.0)));
}

#[test]
fn test_startup_fallback_is_transparent() {
    let h = harness(false);
    assert_eq!(h.cache.mode(), BackendMode::FileOnly);

    assert_eq!(h.cache.put("k", &record(3.0), 1), WriteOutcome::Stored(Source::Primary));
    assert!(h.file_path("k").exists());
    assert!(!h.remote.contains("weather:k"));

    let lookup = h.cache.get::<WeatherRecord>("k");
    assert_eq!(lookup.source(), Some(Source::Primary));
    assert_eq!(lookup.into_option(), Some(record(3.0)));

    h.clock.advance(2);
    assert!(!h.cache.get::<WeatherRecord>("k").is_hit());
    assert!(!h.file_path("k").exists(), "Expired file should be purged on read");
}

#[test]
fn test_expiry_in_remote_mode() {
    let h = harness(true);

    h.cache.put("k", &record(4.0), 1);
    assert!(h.cache.get::<WeatherRecord>("k").is_hit());

    h.clock.advance(2);
    assert_eq!(h.cache.get::<WeatherRecord>("k"), Lookup::Miss);
    assert!(!h.remote.contains("weather:k"));
}

#[test]
fn test_per_call_fallback_keeps_mode() {
    let h = harness(true);
    h.remote.set_failing(true);

    let outcome = h.cache.put("k", &record(5.0), 60);
    assert_eq!(outcome, WriteOutcome::Stored(Source::Fallback));
    assert!(h.file_path("k").exists(), "Fallback write should land in the file cache");

    let lookup = h.cache.get::<WeatherRecord>("k");
    assert_eq!(
        lookup,
        Lookup::Hit {
            value: record(5.0),
            source: Source::Fallback
        }
    );
    assert_eq!(h.cache.mode(), BackendMode::Remote, "A failed call must not change the mode");

    let stats = h.cache.stats();
    assert_eq!(stats.remote_errors, 2);
    assert_eq!(stats.fallback_writes, 1);
    assert_eq!(stats.fallback_reads, 1);

    // Once the remote recovers it is asked first again, and it never saw the entry
    h.remote.set_failing(false);
    assert_eq!(h.cache.get::<WeatherRecord>("k"), Lookup::Miss);
}

#[test]
fn test_clear_removes_entries_from_both_backends() {
    let h = harness(true);
    h.cache.put("k1", &record(1.0), 60);
    h.remote.set_failing(true);
    h.cache.put("k2", &record(2.0), 60);
    h.remote.set_failing(false);
    h.remote.insert_raw("other-app:k", b"not ours", 60);

    h.cache.clear();

    assert!(!h.cache.get::<WeatherRecord>("k1").is_hit());
    assert!(!h.cache.get::<WeatherRecord>("k2").is_hit());
    assert!(!h.file_path("k2").exists());
    assert!(h.remote.contains("other-app:k"), "Clear must stay inside the namespace");
}

#[test]
fn test_clear_in_file_only_mode() {
    let (cache, _clock, _temp_dir) = file_only_cache();
    cache.put("k1", &record(1.0), 60);
    cache.put("k2", &record(2.0), 60);

    cache.clear();

    assert_eq!(cache.get::<WeatherRecord>("k1"), Lookup::Miss);
    assert_eq!(cache.get::<WeatherRecord>("k2"), Lookup::Miss);
}

#[test]
fn test_sanitized_keys_collide_in_file_cache() {
    let (cache, _clock, temp_dir) = file_only_cache();

    cache.put("a:b", &record(1.0), 60);
    cache.put("a;b", &record(2.0), 60);

    assert!(temp_dir.path().join("a_b.cache").exists());
    assert_eq!(
        cache.get::<WeatherRecord>("a:b").into_option(),
        Some(record(2.0)),
        "Keys that sanitize alike share one file; the last write wins"
    );
}

#[test]
fn test_concrete_scenario_in_both_modes() {
    let h = harness(true);
    let (file_cache, file_clock, _temp_dir) = file_only_cache();
    let record_a = record(-4.2);

    h.cache.put(SCENARIO_KEY, &record_a, 3600);
    file_cache.put(SCENARIO_KEY, &record_a, 3600);
    assert_eq!(h.cache.get::<WeatherRecord>(SCENARIO_KEY).into_option(), Some(record_a.clone()));
    assert_eq!(file_cache.get::<WeatherRecord>(SCENARIO_KEY).into_option(), Some(record_a));

    h.clock.advance(3601);
    file_clock.advance(3601);
    assert_eq!(h.cache.get::<WeatherRecord>(SCENARIO_KEY), Lookup::Miss);
    assert_eq!(file_cache.get::<WeatherRecord>(SCENARIO_KEY), Lookup::Miss);
}

#[test]
fn test_reprobe_promotes_after_interval() {
    let h = harness_with(false, Some(Duration::from_secs(30)));
    assert_eq!(h.cache.mode(), BackendMode::FileOnly);
    assert_eq!(h.remote.probes(), 1);

    h.remote.set_reachable(true);
    h.clock.advance(10);
    h.cache.put("k", &record(1.0), 60);
    assert_eq!(h.remote.probes(), 1, "No re-probe before the interval elapses");
    assert_eq!(h.cache.mode(), BackendMode::FileOnly);

    h.clock.advance(20);
    let outcome = h.cache.put("k", &record(2.0), 60);
    assert_eq!(h.remote.probes(), 2);
    assert_eq!(h.cache.mode(), BackendMode::Remote);
    assert_eq!(outcome, WriteOutcome::Stored(Source::Primary));
    assert!(h.remote.contains("weather:k"));
    assert_eq!(h.cache.stats().promotions, 1);
}

#[test]
fn test_failed_reprobe_waits_for_next_interval() {
    let h = harness_with(false, Some(Duration::from_secs(30)));

    h.clock.advance(30);
    h.cache.get::<WeatherRecord>("k");
    assert_eq!(h.remote.probes(), 2);

    h.cache.get::<WeatherRecord>("k");
    assert_eq!(h.remote.probes(), 2, "Failed probe should not be retried on every call");
    assert_eq!(h.cache.mode(), BackendMode::FileOnly);
}

#[test]
fn test_no_reprobe_without_interval() {
    let h = harness(false);

    h.remote.set_reachable(true);
    h.clock.advance(86_400);
    h.cache.put("k", &record(1.0), 60);

    assert_eq!(h.remote.probes(), 1);
    assert_eq!(h.cache.mode(), BackendMode::FileOnly);
}

#[test]
fn test_probe_now_can_demote_and_promote() {
    let h = harness(true);

    h.remote.set_reachable(false);
    assert_eq!(h.cache.probe_now(), BackendMode::FileOnly);

    h.remote.set_reachable(true);
    assert_eq!(h.cache.probe_now(), BackendMode::Remote);
    assert_eq!(h.cache.stats().promotions, 1);
}

#[test]
fn test_close_is_idempotent_and_keeps_file_cache_working() {
    let h = harness(true);

    h.cache.close();
    h.cache.close();

    assert!(h.remote.is_closed());
    assert_eq!(h.cache.mode(), BackendMode::FileOnly);
    assert_eq!(h.cache.put("k", &record(1.0), 60), WriteOutcome::Stored(Source::Primary));
    assert!(h.file_path("k").exists());
    assert_eq!(h.cache.probe_now(), BackendMode::FileOnly);
}

#[test]
fn test_empty_key_and_zero_ttl_are_rejected() {
    let h = harness(true);

    assert_eq!(h.cache.put("", &record(1.0), 60), WriteOutcome::Rejected);
    assert_eq!(h.cache.put("k", &record(1.0), 0), WriteOutcome::Rejected);
    assert_eq!(h.cache.get::<WeatherRecord>(""), Lookup::Miss);
    assert!(!h.remote.contains("weather:k"));
}

#[test]
fn test_payload_of_wrong_type_is_purged() {
    let h = harness(true);
    h.cache.put("k", "just a string", 60);

    assert_eq!(h.cache.get::<WeatherRecord>("k"), Lookup::Miss);
    assert!(!h.remote.contains("weather:k"), "Undecodable payload should be purged");
    assert_eq!(h.cache.get::<String>("k"), Lookup::Miss);
}

#[test]
fn test_corrupt_remote_entry_reads_as_miss() {
    let h = harness(true);
    h.remote.insert_raw("weather:k", b"\x00\x01 garbage", 60);

    assert_eq!(h.cache.get::<WeatherRecord>("k"), Lookup::Miss);
    assert!(!h.remote.contains("weather:k"));
}

#[test]
fn test_unusable_cache_dir_degrades_to_noops() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let blocker = temp_dir.path().join("blocker");
    fs::write(&blocker, b"file in the way").expect("Should write file");
    let cache: CacheOrchestrator<RedisBackend> = CacheOrchestrator::connect_with_clock(
        &CacheConfig::file_only(blocker.join("cache")),
        Arc::new(ManualClock::new(T0)),
    );

    assert_eq!(cache.put("k", &record(1.0), 60), WriteOutcome::Failed);
    assert_eq!(cache.get::<WeatherRecord>("k"), Lookup::Miss);
    cache.clear();

    let stats = cache.stats();
    assert_eq!(
        stats,
        StatsSnapshot {
            misses: 1,
            read_failures: 1,
            write_failures: 1,
            ..StatsSnapshot::default()
        }
    );
}

#[test]
fn test_concurrent_writers_never_expose_partial_entries() {
    let (cache, _clock, _temp_dir) = file_only_cache();
    let cache = Arc::new(cache);

    thread::scope(|scope| {
        for writer in 0..4 {
            let cache = Arc::clone(&cache);
            scope.spawn(move || {
                for i in 0..50 {
                    let outcome = cache.put("shared", &record(writer as f64 * 100.0 + i as f64), 60);
                    assert_eq!(outcome, WriteOutcome::Stored(Source::Primary));
                }
            });
        }
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            scope.spawn(move || {
                for _ in 0..50 {
                    if let Lookup::Hit { value, .. } = cache.get::<WeatherRecord>("shared") {
                        assert_eq!(value.len(), 3, "Readers must only see complete records");
                    }
                }
            });
        }
    });

    assert!(cache.get::<WeatherRecord>("shared").is_hit());
    assert_eq!(cache.stats().write_failures, 0);
}

#[test]
fn test_clear_while_degraded_survives_recovery() {
    let h = harness(true);
    h.cache.put("k", &record(1.0), 60);

    h.remote.set_reachable(false);
    assert_eq!(h.cache.probe_now(), BackendMode::FileOnly);
    h.cache.clear();

    h.remote.set_reachable(true);
    assert_eq!(h.cache.probe_now(), BackendMode::Remote);
    assert_eq!(
        h.cache.get::<WeatherRecord>("k"),
        Lookup::Miss,
        "Cleared entry must not come back after recovery"
    );
}

#[test]
fn test_clear_while_degraded_reaches_remote_when_possible() {
    let h = harness_with(false, Some(Duration::from_secs(60)));
    h.remote.insert_raw("weather:k", b"{}", 600);
    h.remote.set_reachable(true);

    h.cache.clear();

    assert_eq!(h.cache.mode(), BackendMode::FileOnly, "Clear does not promote");
    assert!(!h.remote.contains("weather:k"));
}

#[test]
fn test_recovery_does_not_serve_values_replaced_while_degraded() {
    let h = harness(true);
    h.cache.put("k", &record(1.0), 600);

    h.remote.set_reachable(false);
    h.cache.probe_now();
    assert_eq!(h.cache.put("k", &record(2.0), 600), WriteOutcome::Stored(Source::Primary));
    assert_eq!(h.cache.get::<WeatherRecord>("k").into_option(), Some(record(2.0)));

    h.remote.set_reachable(true);
    assert_eq!(h.cache.probe_now(), BackendMode::Remote);
    assert!(!h.remote.contains("weather:k"), "Promotion should purge the namespace");
    assert_eq!(h.cache.get::<WeatherRecord>("k"), Lookup::Miss);
}

#[test]
fn test_reprobe_promotion_purges_stale_remote_entries() {
    let h = harness_with(false, Some(Duration::from_secs(30)));
    h.remote.insert_raw("weather:k", b"left over from an earlier run", 600);
    h.remote.insert_raw("other-app:k", b"not ours", 600);

    h.remote.set_reachable(true);
    h.clock.advance(30);
    h.cache.put("fresh", &record(1.0), 60);

    assert_eq!(h.cache.mode(), BackendMode::Remote);
    assert!(!h.remote.contains("weather:k"));
    assert!(h.remote.contains("weather:fresh"));
    assert!(h.remote.contains("other-app:k"));
}

#[test]
fn test_failed_purge_keeps_cache_degraded() {
    let h = harness(true);
    h.remote.set_reachable(false);
    h.cache.probe_now();

    // Probes answer but every other call fails
    h.remote.set_reachable(true);
    h.remote.set_failing(true);

    assert_eq!(h.cache.probe_now(), BackendMode::FileOnly);
    assert_eq!(h.cache.stats().promotions, 0);
}

#[test]
fn test_demotion_drops_superseded_fallback_entries() {
    let h = harness(true);
    h.remote.set_failing(true);
    assert_eq!(h.cache.put("k", &record(1.0), 600), WriteOutcome::Stored(Source::Fallback));
    h.remote.set_failing(false);
    h.cache.put("k", &record(2.0), 600);

    h.remote.set_reachable(false);
    assert_eq!(h.cache.probe_now(), BackendMode::FileOnly);

    assert!(!h.file_path("k").exists());
    assert_eq!(h.cache.get::<WeatherRecord>("k"), Lookup::Miss);
}

#[test]
fn test_closing_healthy_cache_drops_fallback_entries() {
    let h = harness(true);
    h.remote.set_failing(true);
    h.cache.put("k", &record(1.0), 600);
    h.remote.set_failing(false);

    h.cache.close();

    assert_eq!(h.cache.get::<WeatherRecord>("k"), Lookup::Miss);
}

#[test]
fn test_unreachable_remote_without_interval_is_released() {
    let h = harness(false);

    assert!(h.remote.is_closed(), "Pool should not linger when nothing will re-probe");
    h.remote.set_reachable(true);
    assert_eq!(h.cache.probe_now(), BackendMode::FileOnly);
}

#[test]
fn test_unreachable_remote_with_interval_is_kept() {
    let h = harness_with(false, Some(Duration::from_secs(30)));

    assert!(!h.remote.is_closed());
}
