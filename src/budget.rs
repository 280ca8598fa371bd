//! # Budget Governor
//! Process-local accounting of compute units against a daily limit.
//!
//! Token counts are converted into compute units through the per-model price
//! table. Usage accumulates per UTC calendar day; the ledger starts from zero at
//! process start and is never persisted. Enforcement is left to callers: the
//! governor only reports `used`, `status` and how many more articles fit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{BudgetConfig, ModelTier, TierShape};

/// Returned by `remaining_capacity` when one article costs nothing.
pub const CAPACITY_SENTINEL: u64 = u32::MAX as u64;

/// Number of past days kept readable in the ledger.
const RETAINED_DAYS: usize = 7;

/// Source of "today" (UTC). Injected so rollover can be tested.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Settable clock for tests and replay tools.
#[derive(Debug)]
pub struct FixedClock {
    day: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day: Mutex::new(day),
        }
    }

    pub fn set(&self, day: NaiveDate) {
        *self.day.lock().expect("clock mutex poisoned") = day;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.day.lock().expect("clock mutex poisoned")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BudgetStatus {
    Ok,
    Warning,
    Critical,
}

impl BudgetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetStatus::Ok => "OK",
            BudgetStatus::Warning => "WARNING",
            BudgetStatus::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSummary {
    pub used: i64,
    pub remaining: i64,
    pub daily_limit: i64,
    pub percent_used: i64,
    pub status: BudgetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelBreakdown {
    pub model: String,
    pub calls: u64,
    pub units: i64,
    pub units_per_call: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelUsage {
    pub calls: u64,
    pub units: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayUsage {
    pub total: f64,
    pub models: BTreeMap<String, ModelUsage>,
}

/// Per-day usage. Days other than "today" are inert.
#[derive(Debug, Default)]
struct UsageLedger {
    days: BTreeMap<NaiveDate, DayUsage>,
}

impl UsageLedger {
    fn day_mut(&mut self, day: NaiveDate) -> &mut DayUsage {
        if !self.days.contains_key(&day) {
            while self.days.len() >= RETAINED_DAYS {
                let Some(oldest) = self.days.keys().next().copied() else {
                    break;
                };
                self.days.remove(&oldest);
            }
        }
        self.days.entry(day).or_default()
    }
}

#[derive(Debug, Clone, Copy)]
struct Price {
    input: f64,
    output: f64,
    embedding_only: bool,
}

pub struct BudgetGovernor {
    prices: HashMap<String, Price>,
    daily_limit: f64,
    warning_percent: f64,
    critical_percent: f64,
    ledger: Mutex<UsageLedger>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BudgetGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetGovernor")
            .field("models", &self.prices.len())
            .field("daily_limit", &self.daily_limit)
            .finish()
    }
}

impl BudgetGovernor {
    pub fn new(tiers: &[ModelTier], budget: &BudgetConfig) -> Self {
        Self::with_clock(tiers, budget, Arc::new(SystemClock))
    }

    pub fn with_clock(tiers: &[ModelTier], budget: &BudgetConfig, clock: Arc<dyn Clock>) -> Self {
        let prices = tiers
            .iter()
            .map(|t| {
                (
                    t.id.clone(),
                    Price {
                        input: t.input_price,
                        output: t.output_price,
                        embedding_only: t.shape == TierShape::Embedding,
                    },
                )
            })
            .collect();
        Self {
            prices,
            daily_limit: budget.daily_limit,
            warning_percent: budget.warning_percent,
            critical_percent: budget.critical_percent,
            ledger: Mutex::new(UsageLedger::default()),
            clock,
        }
    }

    pub fn daily_limit(&self) -> f64 {
        self.daily_limit
    }

    /// Charge one call. Unknown models cost nothing and leave the ledger untouched.
    ///
    /// Negative token counts are not guarded and produce negative charges.
    pub fn record(&self, model: &str, input_tokens: i64, output_tokens: i64) -> f64 {
        let Some(price) = self.prices.get(model) else {
            debug!(target: "budget", model, "unpriced model, charging 0");
            return 0.0;
        };

        let mut units = input_tokens as f64 / 1e6 * price.input;
        if !price.embedding_only {
            units += output_tokens as f64 / 1e6 * price.output;
        }

        let today = self.clock.today();
        let (total, charged) = {
            let mut ledger = self.ledger.lock().expect("budget ledger poisoned");
            let day = ledger.day_mut(today);
            day.total += units;
            let bucket = day.models.entry(model.to_string()).or_default();
            let before = bucket.units;
            bucket.calls += 1;
            bucket.units += units;
            (day.total, rounded_delta(before, bucket.units))
        };

        counter!("budget_units_charged_total", "model" => model.to_string()).increment(charged);
        gauge!("budget_units_used").set(total);

        if self.percent_of_limit(total) >= self.critical_percent {
            warn!(target: "budget", used = total, limit = self.daily_limit, "daily budget critical");
        }
        units
    }

    /// Sum of today's charges.
    pub fn daily_total(&self) -> f64 {
        let today = self.clock.today();
        let ledger = self.ledger.lock().expect("budget ledger poisoned");
        ledger.days.get(&today).map(|d| d.total).unwrap_or(0.0)
    }

    pub fn summary(&self) -> BudgetSummary {
        let used = self.daily_total();
        let remaining = self.daily_limit - used;
        let percent_used = self.percent_of_limit(used).round();
        BudgetSummary {
            used: used.round() as i64,
            remaining: remaining.round() as i64,
            daily_limit: self.daily_limit.round() as i64,
            percent_used: percent_used as i64,
            status: self.status_for(percent_used),
        }
    }

    /// One row per model charged today, most expensive first.
    pub fn breakdown(&self) -> Vec<ModelBreakdown> {
        let today = self.clock.today();
        let ledger = self.ledger.lock().expect("budget ledger poisoned");
        let Some(day) = ledger.days.get(&today) else {
            return Vec::new();
        };
        let mut rows: Vec<ModelBreakdown> = day
            .models
            .iter()
            .map(|(model, usage)| ModelBreakdown {
                model: model.clone(),
                calls: usage.calls,
                units: usage.units.round() as i64,
                units_per_call: if usage.calls == 0 {
                    0
                } else {
                    (usage.units / usage.calls as f64).round() as i64
                },
            })
            .collect();
        rows.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| a.model.cmp(&b.model)));
        rows
    }

    /// How many more articles of `units_per_article` fit today (never negative).
    pub fn remaining_capacity(&self, units_per_article: f64) -> u64 {
        if !(units_per_article > 0.0) {
            return CAPACITY_SENTINEL;
        }
        let left = self.daily_limit - self.daily_total();
        if left <= 0.0 {
            return 0;
        }
        let n = (left / units_per_article).floor();
        if n >= CAPACITY_SENTINEL as f64 {
            CAPACITY_SENTINEL
        } else {
            n as u64
        }
    }

    /// Read-only view of a past (or current) day.
    pub fn usage_on(&self, day: NaiveDate) -> Option<DayUsage> {
        let ledger = self.ledger.lock().expect("budget ledger poisoned");
        ledger.days.get(&day).cloned()
    }

    fn percent_of_limit(&self, used: f64) -> f64 {
        if self.daily_limit <= 0.0 {
            return if used > 0.0 { f64::INFINITY } else { 0.0 };
        }
        used / self.daily_limit * 100.0
    }

    fn status_for(&self, percent: f64) -> BudgetStatus {
        if percent >= self.critical_percent {
            BudgetStatus::Critical
        } else if percent >= self.warning_percent {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Ok
        }
    }
}

/// Whole units the running total crossed, so sub-unit charges still add up.
fn rounded_delta(before: f64, after: f64) -> u64 {
    let delta = after.max(0.0).round() - before.max(0.0).round();
    if delta > 0.0 {
        delta as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_charges_accumulate_into_whole_units() {
        let mut running = 0.0;
        let mut counted = 0;
        for _ in 0..10 {
            let before = running;
            running += 0.3;
            counted += rounded_delta(before, running);
        }
        assert_eq!(counted, 3);
        assert_eq!(rounded_delta(5.0, 4.0), 0);
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn governor(limit: f64) -> (BudgetGovernor, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(day(1)));
        let tiers = vec![
            ModelTier::text("small-classifier", 2457.0, 18252.0),
            ModelTier::embedding("embedder", 1000.0, 8),
        ];
        let budget = BudgetConfig {
            daily_limit: limit,
            ..BudgetConfig::default()
        };
        (BudgetGovernor::with_clock(&tiers, &budget, clock.clone()), clock)
    }

    #[test]
    fn embedding_models_skip_output_term() {
        let (g, _) = governor(10_000.0);
        let units = g.record("embedder", 2_000, 5_000_000);
        assert!((units - 2.0).abs() < 1e-9);
    }

    #[test]
    fn negative_tokens_produce_negative_charges() {
        let (g, _) = governor(10_000.0);
        let units = g.record("small-classifier", -1000, 0);
        assert!(units < 0.0);
        assert!(g.daily_total() < 0.0);
    }

    #[test]
    fn rollover_starts_a_fresh_day_and_keeps_history() {
        let (g, clock) = governor(10_000.0);
        g.record("small-classifier", 1000, 200);
        clock.set(day(2));
        assert_eq!(g.daily_total(), 0.0);
        assert!(g.breakdown().is_empty());
        let past = g.usage_on(day(1)).unwrap();
        assert_eq!(past.models["small-classifier"].calls, 1);
    }

    #[test]
    fn ledger_prunes_old_days() {
        let (g, clock) = governor(10_000.0);
        for d in 1..=(RETAINED_DAYS as u32 + 2) {
            clock.set(day(d));
            g.record("small-classifier", 1000, 0);
        }
        assert!(g.usage_on(day(1)).is_none());
        assert!(g.usage_on(day(RETAINED_DAYS as u32 + 2)).is_some());
    }

    #[test]
    fn zero_limit_is_critical_once_anything_is_used() {
        let (g, _) = governor(0.0);
        assert_eq!(g.summary().status, BudgetStatus::Ok);
        g.record("small-classifier", 1_000_000, 0);
        assert_eq!(g.summary().status, BudgetStatus::Critical);
        assert_eq!(g.remaining_capacity(1.0), 0);
    }
}
