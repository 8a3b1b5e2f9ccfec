//! Unit tests for rollstat-timeseries.
//!
//! These tests drive the minute/hour aggregate through multi-hour scenarios
//! and check every level and interval read against hand-computed values.

use rollstat_test_helpers::prelude::*;
use rollstat_timeseries::{
    HistogramConfig, Level, LevelConfig, LevelSpec, MultiLevelAggregate, TimePoint,
    TimeseriesError, TimeseriesHistogram,
};
use std::time::Duration;

const MINUTE: usize = 0;
const HOUR: usize = 1;
const ALLTIME: usize = 2;

fn t(secs: i64) -> TimePoint {
    TimePoint::from_secs(secs)
}

fn feed(agg: &mut MultiLevelAggregate, series: &SeriesFixture) -> TimePoint {
    t(series.feed(|tick, value| agg.add_value(t(tick), value)))
}

#[test]
fn test_fresh_aggregate_reads_zero() {
    let agg = MultiLevelAggregate::default();
    assert_eq!(agg.num_levels(), 3);
    for level in [MINUTE, HOUR, ALLTIME] {
        assert_eq!(agg.sum(level), 0);
        assert_eq!(agg.avg::<i64>(level), 0);
        assert_eq!(agg.rate::<i64>(level), 0);
        assert_eq!(agg.elapsed(level), 0);
    }
}

#[test]
fn test_minute_hour_progression() {
    let mut agg = MultiLevelAggregate::default();

    agg.add_value(t(0), 10);
    agg.flush(t(0));
    assert_eq!(agg.elapsed(MINUTE), 1);
    assert_eq!(agg.elapsed(HOUR), 1);
    assert_eq!(agg.elapsed(ALLTIME), 1);

    let mut now = feed(&mut agg, &SeriesFixture::starting_at(1).run(299, 10));
    assert_eq!(agg.elapsed(MINUTE), 60);
    assert_eq!(agg.elapsed(HOUR), 300);
    assert_eq!(agg.elapsed(ALLTIME), 300);
    assert_eq!(agg.sum(MINUTE), 600);
    assert_eq!(agg.sum(HOUR), 3000);
    assert_eq!(agg.sum(ALLTIME), 3000);
    for level in [MINUTE, HOUR, ALLTIME] {
        assert_eq!(agg.avg::<i64>(level), 10);
        assert_eq!(agg.rate::<i64>(level), 10);
    }

    now = feed(
        &mut agg,
        &SeriesFixture::starting_at(now.as_secs()).run(3600 * 3 - 300, 10),
    );
    assert_eq!(agg.elapsed(MINUTE), 60);
    assert_eq!(agg.elapsed(HOUR), 3600);
    assert_eq!(agg.elapsed(ALLTIME), 3600 * 3);
    assert_eq!(agg.sum(MINUTE), 600);
    assert_eq!(agg.sum(HOUR), 36_000);
    assert_eq!(agg.sum(ALLTIME), 108_000);
    for level in [MINUTE, HOUR, ALLTIME] {
        assert_eq!(agg.avg::<i64>(level), 10);
        assert_eq!(agg.rate::<i64>(level), 10);
    }

    now = feed(
        &mut agg,
        &SeriesFixture::starting_at(now.as_secs()).run(3600, 100),
    );
    assert_eq!(agg.sum(MINUTE), 6000);
    assert_eq!(agg.sum(HOUR), 360_000);
    assert_eq!(agg.sum(ALLTIME), 108_000 + 360_000);
    assert_eq!(agg.avg::<i64>(MINUTE), 100);
    assert_eq!(agg.avg::<i64>(HOUR), 100);
    assert_eq!(agg.avg::<i64>(ALLTIME), 32);
    assert_eq!(agg.rate::<i64>(MINUTE), 100);
    assert_eq!(agg.rate::<i64>(HOUR), 100);
    assert_eq!(agg.rate::<i64>(ALLTIME), 32);

    now = feed(
        &mut agg,
        &SeriesFixture::starting_at(now.as_secs()).run(1800, 120),
    );
    assert_eq!(agg.sum(MINUTE), 60 * 120);
    assert_eq!(agg.sum(HOUR), 1800 * 100 + 1800 * 120);
    assert_eq!(agg.sum(ALLTIME), 108_000 + 360_000 + 1800 * 120);

    now = feed(
        &mut agg,
        &SeriesFixture::starting_at(now.as_secs()).run(60, 1000),
    );
    assert_eq!(agg.sum(MINUTE), 60 * 1000);
    assert_eq!(agg.sum(HOUR), 1740 * 100 + 1800 * 120 + 60 * 1000);
    assert_eq!(
        agg.sum(ALLTIME),
        108_000 + 360_000 + 1800 * 120 + 60 * 1000
    );

    agg.add_value(now, 23);
    let rate: f64 = agg.rate(MINUTE);
    assert!((rate - 59_023.0 / 60.0).abs() < 0.001, "rate = {rate}");
    assert_eq!(agg.rate::<i64>(MINUTE), 983);

    agg.clear();
    assert_eq!(agg.sum(ALLTIME), 0);
    assert_eq!(agg.elapsed(ALLTIME), 0);
}

#[test]
fn test_query_by_interval() {
    let mut agg = MultiLevelAggregate::default();
    let cur = feed(&mut agg, &SeriesFixture::three_hour_steps());
    assert_eq!(cur, t(10_800));

    // (start offset, end offset, sum, count), offsets relative to `cur`.
    let cases: [(i64, i64, i64, u64); 12] = [
        (-60, 0, 6000, 60),
        (-3600, 0, 41_400, 3600),
        (-7200, 0, 32_400, 7200),
        (-3600, -60, 35_400, 3540),
        (-7200, -60, 32_130, 7140),
        (-7200, -3600, 16_200, 3600),
        (-50, -20, 3000, 30),
        (-3020, -20, 33_600, 3000),
        (-7200, -20, 32_310, 7180),
        (-3000, -1000, 20_000, 2000),
        (-7200, -1000, 27_900, 6200),
        (-7200, -3600, 16_200, 3600),
    ];

    for (from, to, sum, count) in cases {
        let (start, end) = (cur.offset(from), cur.offset(to));
        let label = format!("[{start}, {end})");
        assert_eq!(agg.sum_between(start, end), sum, "sum {label}");
        assert_eq!(agg.count_between(start, end), count, "count {label}");

        let expected_avg = sum / i64::try_from(count).unwrap_or(1);
        assert_eq!(agg.avg_between::<i64>(start, end), expected_avg, "avg {label}");

        let expected_rate = sum / end.secs_since(start);
        assert_eq!(agg.rate_between::<i64>(start, end), expected_rate, "rate {label}");
    }
}

#[test]
fn test_level_for_picks_finest_covering_level() {
    let mut agg = MultiLevelAggregate::default();
    let cur = feed(&mut agg, &SeriesFixture::three_hour_steps());

    assert_eq!(agg.level_for(cur.offset(-60)).bucket_width_secs(), 1);
    assert_eq!(agg.level_for(cur.offset(-61)).bucket_width_secs(), 60);
    assert_eq!(agg.level_for(cur.offset(-3600)).bucket_width_secs(), 60);
    assert!(agg.level_for(cur.offset(-3601)).is_all_time());
}

#[test]
fn test_interval_outside_history_is_zero() {
    let mut agg = MultiLevelAggregate::default();
    feed(&mut agg, &SeriesFixture::starting_at(1000).run(10, 5));

    assert_eq!(agg.sum_between(t(0), t(500)), 0);
    assert_eq!(agg.count_between(t(0), t(500)), 0);
    assert_eq!(agg.rate_between::<i64>(t(0), t(500)), 0);
    assert_eq!(agg.sum_between(t(2000), t(3000)), 0);
}

#[test]
fn test_count_rate_tracks_samples_per_second() {
    let mut agg = MultiLevelAggregate::default();
    for tick in 0..120 {
        agg.add_value_aggregated(t(tick), 30, 3);
    }
    assert_eq!(agg.count_rate::<i64>(MINUTE), 3);
    assert_eq!(agg.rate::<i64>(MINUTE), 30);
    assert_eq!(agg.avg::<i64>(MINUTE), 10);
    assert_eq!(agg.count_rate_between::<i64>(t(100), t(120)), 3);
}

#[test]
fn test_out_of_order_sample_policy() {
    let mut agg = MultiLevelAggregate::default();
    agg.add_value(t(5000), 1);

    // Within both windows.
    agg.add_value(t(4970), 2);
    // Older than the minute window, inside the hour window.
    agg.add_value(t(4000), 4);
    // Older than every bucketed window.
    agg.add_value(t(100), 8);

    assert_eq!(agg.sum(MINUTE), 3);
    assert_eq!(agg.sum(HOUR), 7);
    assert_eq!(agg.sum(ALLTIME), 15);
    assert_eq!(agg.dropped_samples(), 3);
    assert_eq!(agg.latest_time(), t(5000));
}

#[test]
fn test_custom_levels() -> TestResult {
    let config = LevelConfig::builder()
        .level(Duration::from_secs(10), 6)
        .level(Duration::from_secs(600), 6)
        .build()?;
    let mut agg = MultiLevelAggregate::new(&config)?;
    assert_eq!(agg.num_levels(), 3);
    assert_eq!(agg.all_time_index(), config.all_time_index());

    for tick in 0..3600 {
        agg.add_value(t(tick), 1);
    }
    assert_eq!(agg.sum(0), 60);
    assert_eq!(agg.sum(1), 3600);
    assert_eq!(agg.elapsed(0), 60);
    Ok(())
}

#[test]
fn test_all_time_only_aggregate() -> TestResult {
    let mut agg = MultiLevelAggregate::new(&LevelConfig::all_time_only())?;
    assert_eq!(agg.num_levels(), 1);
    agg.add_value(t(0), 4);
    agg.add_value(t(99), 6);
    assert_eq!(agg.sum(0), 10);
    assert_eq!(agg.elapsed(0), 100);
    let rate: f64 = agg.rate(0);
    assert!((rate - 0.1).abs() < 1e-9, "rate = {rate}");
    Ok(())
}

#[test]
fn test_invalid_configuration_errors() {
    let config = LevelConfig {
        levels: vec![LevelSpec::from_secs(60, 60), LevelSpec::from_secs(1, 60)],
    };
    assert_eq!(
        MultiLevelAggregate::new(&config),
        Err(TimeseriesError::non_increasing_coverage(1))
    );
}

#[test]
fn test_config_serde_roundtrip() -> TestResult {
    let config = LevelConfig::minute_hour_day();
    let json = serde_json::to_string(&config)?;
    let decoded: LevelConfig = serde_json::from_str(&json)?;
    assert_eq!(decoded, config);
    Ok(())
}

#[test]
fn test_with_levels_appends_all_time() {
    let agg = MultiLevelAggregate::with_levels(vec![
        Level::bucketed(1, 30),
        Level::all_time(),
    ]);
    assert_eq!(agg.num_levels(), 2);
    assert!(agg.all_time().is_all_time());
    let level = must_some(agg.level(0), "bucketed level");
    assert_eq!(level.duration_secs(), 30);
}

#[test]
fn test_hour_elapsed_while_flushing_every_second() {
    let mut agg = MultiLevelAggregate::default();
    let mut seen = Vec::new();
    for tick in 0..=3659 {
        agg.flush(t(tick));
        if matches!(tick, 59 | 3599 | 3600 | 3630 | 3659) {
            seen.push((tick, agg.elapsed(HOUR)));
        }
    }
    // The oldest hour bucket ages out whole, so elapsed only reaches the
    // full hour on the last tick of a bucket.
    assert_eq!(
        seen,
        vec![(59, 60), (3599, 3600), (3600, 3541), (3630, 3571), (3659, 3600)]
    );
    assert_eq!(agg.elapsed(MINUTE), 60);
    assert_eq!(agg.elapsed(ALLTIME), 3660);
}

#[test]
fn test_histogram_uniform_hour() {
    let mut hist = must(TimeseriesHistogram::new(&HistogramConfig::new(10, 0, 100)));
    for tick in 0..3600_i64 {
        let base = tick.rem_euclid(10) * 10;
        for offset in 0..10 {
            hist.add_value(t(tick), base + offset);
        }
    }
    hist.update(t(3599));

    let counts: Vec<u64> = (0..hist.num_levels()).map(|level| hist.count(level)).collect();
    assert_eq!(counts, vec![600, 6000, 36000, 36000]);
    for level in 0..hist.num_levels() {
        assert_eq!(hist.percentile_bucket_min(0, level), 0);
        for pct in 1..=100_u8 {
            let expected = i64::from((pct - 1) / 10 * 10);
            assert_eq!(
                hist.percentile_bucket_min(pct, level),
                expected,
                "pct {pct} at level {level}"
            );
        }
        assert_eq!(hist.percentile(50, level), 50);
    }

    hist.clear();
    for level in 0..hist.num_levels() {
        assert_eq!(hist.count(level), 0);
        for pct in [0, 1, 50, 99, 100] {
            assert_eq!(hist.percentile_bucket_min(pct, level), 0);
            assert_eq!(hist.percentile(pct, level), 0);
        }
    }
}
