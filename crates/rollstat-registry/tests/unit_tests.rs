//! Unit tests for rollstat-registry.

use std::sync::Arc;
use std::time::Duration;

use rollstat_registry::prelude::*;
use rollstat_test_helpers::prelude::*;

const MINUTE: usize = 0;
const HOUR: usize = 1;
const ALLTIME: usize = 2;

fn t(secs: i64) -> TimePoint {
    TimePoint::from_secs(secs)
}

fn setup(config: RegistryConfig) -> RegistryResult<(Arc<NamedRegistry>, Arc<ManualClock>)> {
    let clock = Arc::new(ManualClock::new(t(0)));
    let registry = NamedRegistry::with_clock(config, clock.clone())?;
    Ok((Arc::new(registry), clock))
}

/// One sample of `1` per second over `[0, seconds)`, clock left at the last tick.
fn one_per_second(registry: &NamedRegistry, clock: &ManualClock, name: &str, seconds: i64) {
    for secs in 0..seconds {
        clock.set(t(secs));
        registry.add_value(name, clock.now(), 1);
    }
}

#[test]
fn test_levels_roll_with_the_clock() -> TestResult {
    let (registry, clock) = setup(RegistryConfig::default())?;
    one_per_second(&registry, &clock, "requests", 120);

    assert_eq!(registry.get_sum("requests", Window::Level(MINUTE)), 60);
    assert_eq!(registry.get_sum("requests", Window::Level(HOUR)), 120);
    assert_eq!(registry.get_sum("requests", Window::Level(ALLTIME)), 120);
    assert_eq!(registry.get_rate::<i64>("requests", Window::Level(MINUTE)), 1);
    assert_eq!(registry.get_avg::<i64>("requests", Window::Level(HOUR)), 1);

    clock.set(t(200));
    assert_eq!(registry.get_sum("requests", Window::Level(MINUTE)), 0);
    assert_eq!(registry.get_count("requests", Window::Level(HOUR)), 120);
    assert_eq!(registry.get_count("requests", Window::Level(ALLTIME)), 120);
    Ok(())
}

#[test]
fn test_interval_reads() -> TestResult {
    let (registry, clock) = setup(RegistryConfig::default())?;
    one_per_second(&registry, &clock, "requests", 120);

    assert_eq!(registry.get_sum("requests", Window::between(t(60), t(120))), 60);
    assert_eq!(registry.get_sum("requests", Window::between(t(0), t(60))), 60);
    assert_eq!(registry.get_count("requests", Window::between(t(90), t(120))), 30);
    assert_eq!(registry.get_sum("requests", Window::between(t(100), t(100))), 0);
    assert_eq!(registry.get_sum("missing", Window::between(t(0), t(60))), 0);
    Ok(())
}

#[test]
fn test_window_from_level_index() {
    assert_eq!(Window::from(ALLTIME), Window::Level(ALLTIME));
    assert_eq!(
        Window::between(t(1), t(2)),
        Window::Interval { start: t(1), end: t(2) }
    );
}

#[test]
fn test_default_exports_apply_to_new_stats() -> TestResult {
    let config = RegistryConfig::builder()
        .default_export(ExportType::Sum)
        .default_export(ExportType::Count)
        .default_export(ExportType::Sum)
        .build()?;
    let (registry, clock) = setup(config)?;
    clock.set(t(30));
    registry.add_value_aggregated("bytes", clock.now(), 900, 3);

    let exports = registry.list_enabled_exports("bytes");
    assert_eq!(exports.len(), 2);

    let counters = registry.counters();
    assert_eq!(counters.len(), 6);
    assert_eq!(counters.get("bytes.sum.60"), Some(&900));
    assert_eq!(counters.get("bytes.sum.3600"), Some(&900));
    assert_eq!(counters.get("bytes.sum"), Some(&900));
    assert_eq!(counters.get("bytes.count"), Some(&3));
    Ok(())
}

#[test]
fn test_percent_export() -> TestResult {
    let (registry, clock) = setup(RegistryConfig::default())?;
    let now = clock.now();
    registry.add_value("cache_hit", now, 1);
    registry.add_value("cache_hit", now, 0);
    registry.add_value("cache_hit", now, 1);
    registry.add_value("cache_hit", now, 1);
    registry.enable_export("cache_hit", ExportType::Percent);

    assert_eq!(registry.counter("cache_hit.pct"), Some(75));
    assert_eq!(registry.counter("cache_hit.pct.60"), Some(75));
    assert_eq!(registry.counter("cache_hit.avg"), None);
    Ok(())
}

#[test]
fn test_export_lifecycle_through_cache() -> TestResult {
    let (registry, _) = setup(RegistryConfig::default())?;
    let mut cache = ThreadLocalCache::new(Arc::clone(&registry));

    cache.add_stat_value_with_export("jobs", 4, ExportType::Rate);
    cache.add_stat_value_with_export("jobs", 4, ExportType::Avg);
    let handle = must_some(cache.handle("jobs"), "handle missing after first update");
    assert!(handle.exports().contains(ExportType::Rate));
    assert!(handle.exports().contains(ExportType::Avg));
    assert_eq!(registry.list_enabled_exports("jobs").to_string(), "{avg, rate}");

    cache.clear_stat_export("jobs", ExportType::Rate);
    assert_eq!(registry.list_enabled_exports("jobs").to_string(), "{avg}");

    assert_eq!(registry.counter("jobs.avg"), Some(4));
    assert_eq!(registry.counter("jobs.rate"), None);
    Ok(())
}

#[test]
fn test_reads_merge_pending_buffers() -> TestResult {
    let (registry, _) = setup(RegistryConfig::default())?;
    let mut cache = ThreadLocalCache::new(Arc::clone(&registry));

    cache.add_stat_value("queue_depth", 5);
    cache.add_stat_value("queue_depth", 7);
    let handle = must_some(cache.handle("queue_depth"), "handle missing");
    assert_eq!(handle.pending(), (12, 2));

    assert_eq!(registry.get_sum("queue_depth", Window::Level(ALLTIME)), 12);
    let handle = must_some(cache.handle("queue_depth"), "handle missing");
    assert_eq!(handle.pending(), (0, 0));
    Ok(())
}

#[test]
fn test_clear_stat_and_reset() -> TestResult {
    let (registry, _) = setup(RegistryConfig::default())?;
    let mut cache = ThreadLocalCache::new(Arc::clone(&registry));

    cache.add_stat_value("a", 1);
    cache.add_stat_value("b", 2);
    assert_eq!(cache.len(), 2);

    assert!(cache.clear_stat("a"));
    assert!(!cache.clear_stat("a"));
    assert_eq!(cache.len(), 1);
    assert_eq!(registry.get_sum("a", Window::Level(ALLTIME)), 1);

    cache.reset_all_data();
    assert!(cache.is_empty());
    assert_eq!(registry.get_sum("b", Window::Level(ALLTIME)), 2);
    assert_eq!(registry.names(), vec!["a".to_owned(), "b".to_owned()]);
    Ok(())
}

#[test]
fn test_clear_resets_data_but_keeps_name() -> TestResult {
    let (registry, clock) = setup(RegistryConfig::default())?;
    one_per_second(&registry, &clock, "errors", 10);
    registry.clear("errors");

    assert!(registry.contains("errors"));
    assert_eq!(registry.get_sum("errors", Window::Level(ALLTIME)), 0);
    assert_eq!(registry.get_count("errors", Window::Level(MINUTE)), 0);

    registry.add_value("errors", clock.now(), 3);
    assert_eq!(registry.get_sum("errors", Window::Level(ALLTIME)), 3);
    Ok(())
}

#[test]
fn test_resolve_with_custom_levels() -> TestResult {
    let (registry, clock) = setup(RegistryConfig::default())?;
    let levels = LevelConfig::builder()
        .level(Duration::from_secs(10), 6)
        .build()?;
    let stat = registry.resolve_with("latency", &levels)?;
    assert_eq!(stat.with_locked(|agg| agg.num_levels()), 2);

    for secs in 0..90 {
        clock.set(t(secs));
        registry.add_value("latency", clock.now(), 2);
    }
    assert_eq!(registry.get_sum("latency", Window::Level(0)), 120);
    assert_eq!(registry.get_sum("latency", Window::Level(1)), 180);
    Ok(())
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let config = RegistryConfig {
        aggregation_interval: Duration::ZERO,
        ..RegistryConfig::default()
    };
    let result = NamedRegistry::new(config);
    assert!(matches!(result, Err(RegistryError::InvalidConfiguration(_))));

    let built = RegistryConfig::builder()
        .aggregation_interval(Duration::ZERO)
        .build();
    assert!(matches!(
        built,
        Err(RegistryError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_config_serde_roundtrip() -> TestResult {
    let config = RegistryConfig::builder()
        .default_levels(LevelConfig::minute_ten_minute_hour())
        .default_export(ExportType::Rate)
        .aggregation_interval(Duration::from_millis(250))
        .name_warning_threshold(64)
        .build()?;
    let json = serde_json::to_string(&config)?;
    let decoded: RegistryConfig = serde_json::from_str(&json)?;
    assert_eq!(decoded, config);
    assert!(json.contains("\"rate\""));
    Ok(())
}

#[test]
fn test_cache_outlives_nothing_it_needs() -> TestResult {
    let (registry, _) = setup(RegistryConfig::default())?;
    {
        let mut cache = ThreadLocalCache::new(Arc::clone(&registry));
        cache.add_stat_value_aggregated("scoped", 30, 3);
    }
    let stat = must_some(registry.get("scoped"), "stat missing");
    assert_eq!(stat.attached_buffers(), 0);
    assert_eq!(stat.with_locked(|agg| agg.sum(ALLTIME)), 30);
    Ok(())
}

#[test]
fn test_cache_counters_and_histograms_reach_exports() -> TestResult {
    let (registry, clock) = setup(RegistryConfig::default())?;
    registry.add_histogram("latency", &HistogramConfig::new(10, 0, 100))?;
    registry.export_percentile("latency", 90)?;
    let mut cache = ThreadLocalCache::new(Arc::clone(&registry));

    for secs in 0..100 {
        clock.set(t(secs));
        cache.increment_counter("served", 1);
        assert!(cache.add_histogram_value("latency", secs));
    }
    assert!(!cache.add_histogram_value("undefined", 1));
    assert_eq!(cache.pending_increments("served"), Some(100));
    assert_eq!(cache.flush(), 2);
    assert_eq!(cache.pending_increments("served"), Some(0));

    let counters = registry.counters();
    assert_eq!(counters.get("served"), Some(&100));
    assert_eq!(counters.get("latency.p90"), Some(&90));
    assert_eq!(counters.get("latency.p90.60"), Some(&90));
    // Buffered values land at the flush time, so the minute level holds all of them.
    assert_eq!(registry.get_histogram_count("latency", Window::Level(0)), 100);
    Ok(())
}
