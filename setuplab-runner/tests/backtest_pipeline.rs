//! Integration tests for the backtest: loose JSON rows through intake, the
//! profile, bar loading, and the summary.

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use setuplab_core::PriceBar;
use setuplab_runner::{
    intake_rows, run_backtest, BarResolution, InMemoryBarSource, OptimizerProfile, Resolution,
    ResolutionUsed, RunnerConfig, SetupRow,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn ms(d: u32, hour: u32, minute: u32) -> i64 {
    Utc.with_ymd_and_hms(2024, 3, d, hour, minute, 0)
        .unwrap()
        .timestamp_millis()
}

/// Bullish setups trigger at 101 and run through both targets.
fn rally(d: u32) -> Vec<PriceBar> {
    vec![
        PriceBar::new(ms(d, 14, 30), 102.0, 102.0, 100.5, 100.8),
        PriceBar::new(ms(d, 14, 31), 100.8, 103.5, 100.6, 103.2),
        PriceBar::new(ms(d, 14, 32), 103.2, 105.5, 103.0, 105.2),
    ]
}

fn rows() -> Vec<SetupRow> {
    let value = json!([
        {
            "engine_setup_id": "fw-1", "session_date": "2024-03-01",
            "setup_type": "fade_at_wall", "direction": "bullish", "regime": "ranging",
            "entry_zone_low": "100", "entry_zone_high": 101,
            "stop_price": 98, "target_1_price": 103, "target_2_price": 105
        },
        {
            "id": "tp-1", "session_date": "2024-03-04",
            "setup_type": "trend_pullback", "direction": "bullish", "regime": "trending",
            "entry_low": 100, "entry_high": 101, "stop_price": 98, "target1_price": 103,
            "trade_management": { "partial_at_t1_pct": "0.8", "move_stop_to_breakeven": false }
        },
        {
            "id": "blocked", "session_date": "2024-03-01", "setup_type": "fade_at_wall",
            "direction": "bullish", "gate_status": "blocked",
            "entry_low": 100, "entry_high": 101, "stop_price": 98, "target1_price": 103
        },
        {
            "id": "hidden", "session_date": "2024-03-01", "setup_type": "fade_at_wall",
            "direction": "bullish", "tier": "hidden",
            "entry_low": 100, "entry_high": 101, "stop_price": 98, "target1_price": 103
        },
        {
            "id": "paused", "session_date": "2024-03-01", "setup_type": "orb_breakout",
            "direction": "bullish",
            "entry_low": 100, "entry_high": 101, "stop_price": 98, "target1_price": 103
        },
        {
            "id": "broken", "session_date": "2024-03-01", "setup_type": "fade_at_wall",
            "direction": "sideways",
            "entry_low": 100, "entry_high": 101, "stop_price": 98, "target1_price": 103
        },
        {
            "id": "late", "session_date": "2024-04-01", "setup_type": "fade_at_wall",
            "direction": "bullish",
            "entry_low": 100, "entry_high": 101, "stop_price": 98, "target1_price": 103
        }
    ]);
    serde_json::from_value(value).unwrap()
}

fn profile() -> OptimizerProfile {
    let mut profile = OptimizerProfile::default();
    profile.paused_setup_types.insert("orb_breakout".into());
    profile
}

fn config_for(profile: &OptimizerProfile) -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.filter.to = Some(day(31));
    profile.configure(&mut config);
    config
}

fn source() -> InMemoryBarSource {
    InMemoryBarSource::new()
        .with_session(day(1), BarResolution::Second, rally(1))
        .with_session(day(4), BarResolution::Minute, rally(4))
}

#[test]
fn intake_counts_every_skip_reason() {
    let profile = profile();
    let config = config_for(&profile);
    let intake = intake_rows(&rows(), &config.filter);

    let ids: Vec<_> = intake.setups.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["fw-1", "tp-1"]);
    assert_eq!(intake.malformed, 1);
    assert_eq!(intake.blocked, 1);
    assert_eq!(intake.hidden, 1);
    assert_eq!(intake.paused_setup_type, 1);
    assert_eq!(intake.outside_range, 1);
    assert_eq!(intake.setups[0].entry_low, 100.0);
    assert_eq!(
        intake.setups[1].trade_management.map(|tm| tm.partial_at_t1_pct),
        Some(0.8)
    );
}

#[test]
fn backtest_summarizes_admitted_setups() {
    let profile = profile();
    let mut config = config_for(&profile);
    config.backtest.include_rows = true;
    let intake = intake_rows(&rows(), &config.filter);
    let summary = run_backtest(&intake, &source(), &config, Some(&profile));

    assert_eq!(summary.setup_count, 2);
    assert_eq!(summary.evaluated_setup_count, 2);
    assert_eq!(summary.skipped_setup_count, 0);
    assert_eq!(summary.missing_target2_count, 1);
    assert_eq!(summary.requested_resolution, Resolution::Auto);
    assert_eq!(summary.resolution_used, ResolutionUsed::Second);
    assert_eq!(summary.resolution_fallback_sessions, vec![day(4)]);

    let p = &summary.profitability;
    assert_eq!(p.triggered_count, 2);
    assert_eq!(p.resolved_count, 2);
    assert_eq!(p.positive_realized_rate_pct, 100.0);
    assert!(p.expectancy_r > 0.0);
    assert_eq!(p.by_setup_type.len(), 2);
    assert_eq!(summary.metrics.t1_win_rate_pct, 100.0);

    let rows = summary.rows.as_ref().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.outcome.final_outcome.is_some()));

    assert_eq!(summary.notes[0], "Skipped 1 malformed setup rows.");
    assert!(summary
        .notes
        .contains(&"Second bars unavailable for 1 sessions; used minute bars fallback.".to_string()));
}

#[test]
fn summary_serializes_without_rows_by_default() {
    let profile = profile();
    let config = config_for(&profile);
    let intake = intake_rows(&rows(), &config.filter);
    let summary = run_backtest(&intake, &source(), &config, Some(&profile));

    let value = serde_json::to_value(&summary).unwrap();
    assert!(value.get("rows").is_none());
    assert_eq!(value["resolution_used"], "second");
    assert_eq!(value["profitability"]["triggered_count"], 2);
    assert_eq!(value["config_hash"].as_str().map(str::len), Some(64));
}

#[test]
fn forced_minute_resolution_ignores_second_bars() {
    let profile = profile();
    let mut config = config_for(&profile);
    config.backtest.resolution = Resolution::Minute;
    let intake = intake_rows(&rows(), &config.filter);
    let summary = run_backtest(&intake, &source(), &config, Some(&profile));

    assert_eq!(summary.evaluated_setup_count, 1);
    assert_eq!(summary.skipped_setup_count, 1);
    assert_eq!(summary.missing_bar_sessions, vec![day(1)]);
    assert!(summary.resolution_fallback_sessions.is_empty());
}
