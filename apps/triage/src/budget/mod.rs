//! Budget ledger: daily and monthly spend windows shared by every worker.
//!
//! The ledger is the only mutable state shared across the pipeline. All
//! reads and writes go through one mutex, so concurrent `record_spend`
//! calls apply one at a time and `status` never sees a half-applied spend.
//!
//! Limits are advisory: a spend is always recorded, and overshooting a
//! limit only produces a `BudgetWarning` for the caller to act on.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    Daily,
    Monthly,
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetPeriod::Daily => write!(f, "daily"),
            BudgetPeriod::Monthly => write!(f, "monthly"),
        }
    }
}

/// One accounting period. Owned by the ledger, never handed out.
#[derive(Debug, Clone)]
struct BudgetWindow {
    limit: f64,
    used: f64,
    period_start: DateTime<Utc>,
}

impl BudgetWindow {
    fn new(limit: f64, period_start: DateTime<Utc>) -> Self {
        Self {
            limit,
            used: 0.0,
            period_start,
        }
    }

    fn remaining(&self) -> f64 {
        (self.limit - self.used).max(0.0)
    }

    fn reset(&mut self, now: DateTime<Utc>) {
        self.used = 0.0;
        self.period_start = now;
    }

    fn snapshot(&self) -> WindowStatus {
        WindowStatus {
            limit: self.limit,
            used: self.used,
            remaining: self.remaining(),
            percent_used: if self.limit > 0.0 {
                self.used / self.limit * 100.0
            } else {
                0.0
            },
            period_start: self.period_start,
            over_limit: self.used > self.limit,
        }
    }
}

/// Immutable view of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatus {
    pub limit: f64,
    pub used: f64,
    pub remaining: f64,
    pub percent_used: f64,
    pub period_start: DateTime<Utc>,
    /// Advisory flag: `used` has gone past `limit`.
    pub over_limit: bool,
}

/// Immutable snapshot of both windows, taken under the ledger lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub daily: WindowStatus,
    pub monthly: WindowStatus,
}

impl BudgetStatus {
    /// What the router may spend: the tighter of the two windows.
    pub fn available(&self) -> f64 {
        self.daily.remaining.min(self.monthly.remaining)
    }

    pub fn has_warning(&self) -> bool {
        self.daily.over_limit || self.monthly.over_limit
    }
}

/// Raised when a spend pushes a window past its limit. Informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetWarning {
    pub period: BudgetPeriod,
    pub limit: f64,
    pub used: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpendOutcome {
    pub warnings: Vec<BudgetWarning>,
}

impl SpendOutcome {
    pub fn is_over_budget(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Token counts reported by a completed model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Accumulated usage for one model since process start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug)]
struct LedgerState {
    daily: BudgetWindow,
    monthly: BudgetWindow,
    usage: HashMap<String, ModelUsage>,
}

impl LedgerState {
    fn window_mut(&mut self, period: BudgetPeriod) -> &mut BudgetWindow {
        match period {
            BudgetPeriod::Daily => &mut self.daily,
            BudgetPeriod::Monthly => &mut self.monthly,
        }
    }

    fn apply_spend(&mut self, amount: f64) -> SpendOutcome {
        let mut outcome = SpendOutcome::default();
        for period in [BudgetPeriod::Daily, BudgetPeriod::Monthly] {
            let window = self.window_mut(period);
            window.used += amount;
            if window.used > window.limit {
                outcome.warnings.push(BudgetWarning {
                    period,
                    limit: window.limit,
                    used: window.used,
                });
            }
        }
        outcome
    }
}

/// Owns both spend windows. Share it as `Arc<BudgetLedger>`.
#[derive(Debug)]
pub struct BudgetLedger {
    state: Mutex<LedgerState>,
}

impl BudgetLedger {
    /// Takes the limits as given. A zero limit is a ledger that can't
    /// afford any paid model; use `try_new` for limits read from config.
    pub fn new(daily_limit: f64, monthly_limit: f64, now: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                daily: BudgetWindow::new(daily_limit, now),
                monthly: BudgetWindow::new(monthly_limit, now),
                usage: HashMap::new(),
            }),
        }
    }

    /// Like `new`, but both limits must be finite and positive.
    pub fn try_new(
        daily_limit: f64,
        monthly_limit: f64,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        check_limits(daily_limit, monthly_limit).map_err(AppError::Configuration)?;
        Ok(Self::new(daily_limit, monthly_limit, now))
    }

    /// The guarded data is plain numbers that are always left consistent,
    /// so a panic elsewhere while holding the lock does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `amount` to both windows. Never rejects a spend.
    ///
    /// Negative or non-finite amounts are ignored (logged), since they can
    /// only come from a broken cost estimate.
    pub fn record_spend(&self, amount: f64, timestamp: DateTime<Utc>) -> SpendOutcome {
        if !amount.is_finite() || amount < 0.0 {
            warn!("Ignoring invalid spend amount {amount} at {timestamp}");
            return SpendOutcome::default();
        }
        let outcome = self.lock().apply_spend(amount);
        log_spend(amount, timestamp, &outcome);
        outcome
    }

    /// Records a spend attributed to a model, updating its usage counters in
    /// the same critical section.
    pub fn record_model_spend(
        &self,
        model_id: &str,
        usage: TokenUsage,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> SpendOutcome {
        if !amount.is_finite() || amount < 0.0 {
            warn!("Ignoring invalid spend amount {amount} for model {model_id}");
            return SpendOutcome::default();
        }
        let outcome = {
            let mut state = self.lock();
            let outcome = state.apply_spend(amount);
            let entry = state.usage.entry(model_id.to_string()).or_default();
            entry.calls += 1;
            entry.total_tokens = entry.total_tokens.saturating_add(usage.total());
            entry.total_cost += amount;
            outcome
        };
        log_spend(amount, timestamp, &outcome);
        outcome
    }

    pub fn status(&self) -> BudgetStatus {
        let state = self.lock();
        BudgetStatus {
            daily: state.daily.snapshot(),
            monthly: state.monthly.snapshot(),
        }
    }

    /// `min(daily.remaining, monthly.remaining)`, read atomically.
    pub fn available(&self) -> f64 {
        let state = self.lock();
        state.daily.remaining().min(state.monthly.remaining())
    }

    pub fn reset_window(&self, period: BudgetPeriod) {
        self.reset_window_at(period, Utc::now());
    }

    pub fn reset_window_at(&self, period: BudgetPeriod, now: DateTime<Utc>) {
        self.lock().window_mut(period).reset(now);
        info!("Reset {period} budget window at {now}");
    }

    /// Resets whichever windows `now` has moved past: the daily window on a
    /// new UTC date, the monthly window on a new UTC month. Returns the
    /// periods that were reset.
    pub fn roll_over(&self, now: DateTime<Utc>) -> Vec<BudgetPeriod> {
        let mut rolled = Vec::new();
        {
            let mut state = self.lock();
            if now.date_naive() != state.daily.period_start.date_naive() {
                state.daily.reset(now);
                rolled.push(BudgetPeriod::Daily);
            }
            let start = state.monthly.period_start;
            if now.year() != start.year() || now.month() != start.month() {
                state.monthly.reset(now);
                rolled.push(BudgetPeriod::Monthly);
            }
        }
        for period in &rolled {
            info!("Rolled over {period} budget window at {now}");
        }
        rolled
    }

    pub fn update_limits(&self, daily_limit: f64, monthly_limit: f64) -> Result<(), AppError> {
        check_limits(daily_limit, monthly_limit).map_err(AppError::Input)?;
        let mut state = self.lock();
        state.daily.limit = daily_limit;
        state.monthly.limit = monthly_limit;
        info!("Budget limits updated: daily={daily_limit:.2} monthly={monthly_limit:.2}");
        Ok(())
    }

    pub fn usage_stats(&self) -> HashMap<String, ModelUsage> {
        self.lock().usage.clone()
    }
}

fn check_limits(daily_limit: f64, monthly_limit: f64) -> Result<(), String> {
    for (name, value) in [("daily", daily_limit), ("monthly", monthly_limit)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(format!("{name} budget limit must be positive, got {value}"));
        }
    }
    Ok(())
}

fn log_spend(amount: f64, timestamp: DateTime<Utc>, outcome: &SpendOutcome) {
    debug!("Recorded spend {amount:.4} at {timestamp}");
    for warning in &outcome.warnings {
        warn!(
            "Budget warning: {} window used {:.4} of {:.2}",
            warning.period, warning.used, warning.limit
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn ledger() -> BudgetLedger {
        BudgetLedger::new(20.0, 300.0, at(2026, 3, 10, 8))
    }

    #[test]
    fn test_fresh_ledger_status() {
        let status = ledger().status();
        assert_eq!(status.daily.limit, 20.0);
        assert_eq!(status.daily.used, 0.0);
        assert_eq!(status.daily.remaining, 20.0);
        assert_eq!(status.monthly.remaining, 300.0);
        assert_eq!(status.available(), 20.0);
        assert!(!status.has_warning());
    }

    #[test]
    fn test_record_spend_updates_both_windows() {
        let ledger = ledger();
        let outcome = ledger.record_spend(5.0, at(2026, 3, 10, 9));
        assert!(!outcome.is_over_budget());

        let status = ledger.status();
        assert_eq!(status.daily.used, 5.0);
        assert_eq!(status.monthly.used, 5.0);
        assert_eq!(status.daily.remaining, 15.0);
        assert_eq!(status.monthly.remaining, 295.0);
        assert!((status.daily.percent_used - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_overspend_is_recorded_with_warning() {
        let ledger = ledger();
        ledger.record_spend(19.0, at(2026, 3, 10, 9));
        let outcome = ledger.record_spend(3.0, at(2026, 3, 10, 10));

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].period, BudgetPeriod::Daily);
        assert_eq!(outcome.warnings[0].used, 22.0);

        let status = ledger.status();
        assert_eq!(status.daily.used, 22.0);
        assert_eq!(status.daily.remaining, 0.0);
        assert!(status.daily.over_limit);
        assert!(status.has_warning());
        assert_eq!(status.available(), 0.0);
    }

    #[test]
    fn test_invalid_amounts_are_ignored() {
        let ledger = ledger();
        for amount in [-1.0, f64::NAN, f64::INFINITY] {
            let outcome = ledger.record_spend(amount, at(2026, 3, 10, 9));
            assert!(!outcome.is_over_budget());
        }
        assert_eq!(ledger.status().daily.used, 0.0);
    }

    #[test]
    fn test_reset_window_only_touches_one_period() {
        let ledger = ledger();
        ledger.record_spend(7.0, at(2026, 3, 10, 9));
        let now = at(2026, 3, 11, 0);
        ledger.reset_window_at(BudgetPeriod::Daily, now);

        let status = ledger.status();
        assert_eq!(status.daily.used, 0.0);
        assert_eq!(status.daily.period_start, now);
        assert_eq!(status.monthly.used, 7.0);
    }

    #[test]
    fn test_roll_over_same_day_is_noop() {
        let ledger = ledger();
        ledger.record_spend(2.0, at(2026, 3, 10, 9));
        assert!(ledger.roll_over(at(2026, 3, 10, 23)).is_empty());
        assert_eq!(ledger.status().daily.used, 2.0);
    }

    #[test]
    fn test_roll_over_next_day_resets_daily_only() {
        let ledger = ledger();
        ledger.record_spend(2.0, at(2026, 3, 10, 9));
        let rolled = ledger.roll_over(at(2026, 3, 11, 1));
        assert_eq!(rolled, vec![BudgetPeriod::Daily]);
        let status = ledger.status();
        assert_eq!(status.daily.used, 0.0);
        assert_eq!(status.monthly.used, 2.0);
    }

    #[test]
    fn test_roll_over_next_month_resets_both() {
        let ledger = ledger();
        ledger.record_spend(2.0, at(2026, 3, 10, 9));
        let rolled = ledger.roll_over(at(2026, 4, 1, 0));
        assert_eq!(rolled, vec![BudgetPeriod::Daily, BudgetPeriod::Monthly]);
        assert_eq!(ledger.status().monthly.used, 0.0);
    }

    #[test]
    fn test_update_limits_validates() {
        let ledger = ledger();
        assert!(ledger.update_limits(0.0, 100.0).is_err());
        assert!(ledger.update_limits(10.0, f64::NAN).is_err());
        ledger.update_limits(10.0, 100.0).unwrap();
        let status = ledger.status();
        assert_eq!(status.daily.limit, 10.0);
        assert_eq!(status.monthly.limit, 100.0);
    }

    #[test]
    fn test_try_new_rejects_bad_limits() {
        let now = at(2026, 3, 10, 8);
        for (daily, monthly) in [
            (f64::NAN, 300.0),
            (-1.0, 300.0),
            (20.0, 0.0),
            (20.0, f64::INFINITY),
        ] {
            let err = BudgetLedger::try_new(daily, monthly, now).unwrap_err();
            assert_eq!(err.code(), "CONFIGURATION_ERROR", "{daily}/{monthly}");
            assert!(err.is_fatal());
        }
        let ledger = BudgetLedger::try_new(20.0, 300.0, now).unwrap();
        assert_eq!(ledger.status().daily.limit, 20.0);
    }

    #[test]
    fn test_update_limits_error_is_not_fatal() {
        let err = ledger().update_limits(-5.0, 100.0).unwrap_err();
        assert_eq!(err.code(), "INPUT_ERROR");
        assert_eq!(ledger().status().daily.limit, 20.0);
    }

    #[test]
    fn test_model_spend_tracks_usage() {
        let ledger = ledger();
        let ts = at(2026, 3, 10, 9);
        ledger.record_model_spend("claude-3-haiku", TokenUsage::new(500, 200), 0.1, ts);
        ledger.record_model_spend("claude-3-haiku", TokenUsage::new(100, 100), 0.05, ts);

        let stats = ledger.usage_stats();
        let haiku = &stats["claude-3-haiku"];
        assert_eq!(haiku.calls, 2);
        assert_eq!(haiku.total_tokens, 900);
        assert!((haiku.total_cost - 0.15).abs() < 1e-9);
        assert!((ledger.status().daily.used - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_spends_are_serialized() {
        let ledger = Arc::new(ledger());
        let ts = at(2026, 3, 10, 9);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        ledger.record_spend(0.01, ts);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!((ledger.status().monthly.used - 20.0).abs() < 1e-6);
    }
}
