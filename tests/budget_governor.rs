// tests/budget_governor.rs
//
// Accounting scenarios for the daily compute budget.

use std::sync::Arc;

use chrono::NaiveDate;
use threatwire::budget::{BudgetGovernor, BudgetStatus, FixedClock, CAPACITY_SENTINEL};
use threatwire::config::{BudgetConfig, ModelTier};

fn tiers() -> Vec<ModelTier> {
    vec![
        ModelTier::text("small-classifier", 2457.0, 18252.0),
        // one unit per token, keeps the arithmetic readable
        ModelTier::text("flat", 1_000_000.0, 0.0),
        ModelTier::embedding("embedder", 1841.0, 384),
    ]
}

fn governor(limit: f64) -> BudgetGovernor {
    let budget = BudgetConfig {
        daily_limit: limit,
        ..BudgetConfig::default()
    };
    let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()));
    BudgetGovernor::with_clock(&tiers(), &budget, clock)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn charge_follows_price_table() {
    let g = governor(10_000.0);
    let units = g.record("small-classifier", 1000, 200);
    assert!(close(units, 6.1074), "got {units}");
    g.record("small-classifier", 1000, 200);
    assert!(close(g.daily_total(), 12.2148), "got {}", g.daily_total());
}

#[test]
fn unknown_model_is_free_and_untracked() {
    let g = governor(10_000.0);
    assert_eq!(g.record("not-in-table", 1_000_000, 1_000_000), 0.0);
    assert_eq!(g.daily_total(), 0.0);
    assert!(g.breakdown().is_empty());
}

#[test]
fn embedding_charge_ignores_output_tokens() {
    let g = governor(10_000.0);
    let units = g.record("embedder", 1_000_000, 5_000);
    assert!(close(units, 1841.0));
}

#[test]
fn status_uses_rounded_percentage() {
    let g = governor(10_000.0);
    g.record("flat", 9460, 0);
    let s = g.summary();
    assert_eq!(s.used, 9460);
    assert_eq!(s.remaining, 540);
    assert_eq!(s.percent_used, 95);
    assert_eq!(s.status, BudgetStatus::Critical);
}

#[test]
fn warning_band() {
    let g = governor(10_000.0);
    g.record("flat", 7940, 0);
    assert_eq!(g.summary().status, BudgetStatus::Ok);
    g.record("flat", 60, 0);
    let s = g.summary();
    assert_eq!(s.percent_used, 80);
    assert_eq!(s.status, BudgetStatus::Warning);
}

#[test]
fn overspend_reports_negative_remaining() {
    let g = governor(10_000.0);
    g.record("flat", 10_500, 0);
    let s = g.summary();
    assert_eq!(s.used, 10_500);
    assert_eq!(s.remaining, -500);
    assert_eq!(s.percent_used, 105);
    assert_eq!(s.status, BudgetStatus::Critical);
    assert_eq!(g.remaining_capacity(1.0), 0);
}

#[test]
fn summary_serializes_uppercase_status() {
    let g = governor(10_000.0);
    let v = serde_json::to_value(g.summary()).unwrap();
    assert_eq!(v["status"], "OK");
    assert_eq!(v["daily_limit"], 10_000);
}

#[test]
fn capacity_floors_and_never_goes_negative() {
    let g = governor(10_000.0);
    g.record("flat", 9_950, 0);
    assert_eq!(g.remaining_capacity(20.0), 2);
    g.record("flat", 100, 0);
    assert_eq!(g.remaining_capacity(20.0), 0);
}

#[test]
fn capacity_for_free_articles_is_sentinel() {
    let g = governor(10_000.0);
    assert_eq!(g.remaining_capacity(0.0), CAPACITY_SENTINEL);
    assert_eq!(g.remaining_capacity(-3.0), CAPACITY_SENTINEL);
}

#[test]
fn breakdown_sorted_by_units() {
    let g = governor(10_000.0);
    g.record("small-classifier", 1000, 200);
    g.record("flat", 50, 0);
    g.record("flat", 50, 0);
    let rows = g.breakdown();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].model, "flat");
    assert_eq!(rows[0].calls, 2);
    assert_eq!(rows[0].units, 100);
    assert_eq!(rows[0].units_per_call, 50);
    assert_eq!(rows[1].model, "small-classifier");
    assert_eq!(rows[1].units, 6);
}

#[test]
fn concurrent_records_are_not_lost() {
    let g = Arc::new(governor(1_000_000.0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let g = g.clone();
            std::thread::spawn(move || {
                for _ in 0..250 {
                    g.record("flat", 1, 0);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert!((g.daily_total() - 2000.0).abs() < 1e-6);
}

#[test]
fn charges_are_additive() {
    let split = governor(10_000.0);
    let a = split.record("small-classifier", 1200, 300);
    let b = split.record("small-classifier", 800, 450);

    let joined = governor(10_000.0);
    let c = joined.record("small-classifier", 2000, 750);

    assert!((a + b - c).abs() < 1e-9);
    assert!((split.daily_total() - joined.daily_total()).abs() < 1e-9);
}
