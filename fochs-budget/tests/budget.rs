use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use fochs_budget::*;
use proptest::prelude::*;

/// A clock the test moves by hand.
struct ManualClock(Mutex<NaiveDate>);

impl ManualClock {
    fn at(y: i32, m: u32, d: u32) -> Arc<Self> {
        Arc::new(Self(Mutex::new(NaiveDate::from_ymd_opt(y, m, d).unwrap())))
    }

    fn set(&self, y: i32, m: u32, d: u32) {
        *self.0.lock().unwrap() = NaiveDate::from_ymd_opt(y, m, d).unwrap();
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.0.lock().unwrap()
    }
}

fn limits() -> BudgetLimits {
    BudgetLimits {
        daily: 1_000,
        monthly: 3_000,
        per_run: 500,
    }
}

// --- Rollover ---

#[test]
fn new_day_resets_daily_but_not_monthly() {
    let clock = ManualClock::at(2026, 3, 10);
    let budget = TokenBudget::with_clock(limits(), clock.clone());
    budget.record_usage(800);

    clock.set(2026, 3, 11);
    let status = budget.status();
    assert_eq!(status.daily_usage, 0);
    assert_eq!(status.monthly_usage, 800);
    assert_eq!(status.date, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
}

#[test]
fn new_month_resets_monthly_and_clears_automatic_trip() {
    let clock = ManualClock::at(2026, 3, 31);
    let budget = TokenBudget::with_clock(limits(), clock.clone());
    budget.record_usage(1_500);
    assert!(budget.is_killed());

    clock.set(2026, 4, 1);
    let status = budget.status();
    assert_eq!(status.monthly_usage, 0);
    assert_eq!(status.daily_usage, 0);
    assert!(!status.killed);
    assert!(budget.check_budget(100));
}

#[test]
fn new_month_keeps_manual_kill() {
    let clock = ManualClock::at(2026, 3, 31);
    let budget = TokenBudget::with_clock(limits(), clock.clone());
    budget.kill();

    clock.set(2026, 4, 1);
    assert!(budget.is_killed());
    assert_eq!(budget.status().kill_switch, KillSwitch::Manual);
    budget.resume();
    assert!(!budget.is_killed());
}

#[test]
fn same_month_next_year_is_a_new_month() {
    let clock = ManualClock::at(2025, 6, 15);
    let budget = TokenBudget::with_clock(limits(), clock.clone());
    budget.record_usage(200);

    clock.set(2026, 6, 15);
    assert_eq!(budget.status().monthly_usage, 0);
}

#[test]
fn daily_trip_blocks_until_next_month_even_after_daily_reset() {
    let clock = ManualClock::at(2026, 5, 10);
    let budget = TokenBudget::with_clock(limits(), clock.clone());
    budget.record_usage(1_001);
    assert!(budget.is_killed());

    clock.set(2026, 5, 11);
    assert_eq!(budget.status().daily_usage, 0);
    assert!(!budget.check_budget(1));
}

#[test]
fn monthly_ceiling_is_checked() {
    let clock = ManualClock::at(2026, 5, 1);
    let budget = TokenBudget::with_clock(limits(), clock.clone());
    for day in 1..=3 {
        clock.set(2026, 5, day);
        budget.record_usage(900);
    }
    assert!(!budget.is_killed());
    clock.set(2026, 5, 4);
    let err = budget.reserve(400).unwrap_err();
    assert!(matches!(
        err,
        BudgetError::Exceeded {
            scope: BudgetScope::Monthly,
            usage: 2_700,
            ..
        }
    ));
}

#[test]
fn reservation_settled_after_midnight_charges_the_new_day() {
    let clock = ManualClock::at(2026, 3, 10);
    let budget = TokenBudget::with_clock(limits(), clock.clone());
    budget.record_usage(200);
    let reservation = budget.reserve(400).unwrap();

    clock.set(2026, 3, 11);
    reservation.settle(150);

    let status = budget.status();
    assert_eq!(status.daily_usage, 150);
    assert_eq!(status.monthly_usage, 350);
}

#[test]
fn reservation_settled_in_a_new_month_charges_the_new_month() {
    let clock = ManualClock::at(2026, 3, 31);
    let budget = TokenBudget::with_clock(limits(), clock.clone());
    budget.record_usage(200);
    let reservation = budget.reserve(400).unwrap();

    clock.set(2026, 4, 1);
    reservation.settle(150);

    let status = budget.status();
    assert_eq!(status.daily_usage, 150);
    assert_eq!(status.monthly_usage, 150);
}

#[test]
fn reservation_dropped_after_midnight_leaves_the_new_day_untouched() {
    let clock = ManualClock::at(2026, 3, 10);
    let budget = TokenBudget::with_clock(limits(), clock.clone());
    let reservation = budget.reserve(400).unwrap();

    clock.set(2026, 3, 11);
    budget.record_usage(100);
    drop(reservation);

    let status = budget.status();
    assert_eq!(status.daily_usage, 100);
    assert_eq!(status.monthly_usage, 100);
}

// --- Persistence ---

#[test]
fn state_file_restores_same_day_usage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("budget").join("state.json");
    let clock = ManualClock::at(2026, 7, 4);

    let first = TokenBudget::with_clock(limits(), clock.clone()).with_state_file(&path);
    first.record_usage(321);
    assert!(path.exists());

    let second = TokenBudget::with_clock(limits(), clock.clone()).with_state_file(&path);
    let status = second.status();
    assert_eq!(status.daily_usage, 321);
    assert_eq!(status.monthly_usage, 321);
}

#[test]
fn state_file_drops_stale_daily_usage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let clock = ManualClock::at(2026, 7, 4);

    TokenBudget::with_clock(limits(), clock.clone())
        .with_state_file(&path)
        .record_usage(321);

    clock.set(2026, 7, 5);
    let restored = TokenBudget::with_clock(limits(), clock.clone()).with_state_file(&path);
    let status = restored.status();
    assert_eq!(status.daily_usage, 0);
    assert_eq!(status.monthly_usage, 321);
}

#[test]
fn corrupt_state_file_starts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "not json").unwrap();

    let budget = TokenBudget::new(limits()).with_state_file(&path);
    assert_eq!(budget.status().daily_usage, 0);
    budget.record_usage(5);
    assert_eq!(
        TokenBudget::new(limits())
            .with_state_file(&path)
            .status()
            .daily_usage,
        5
    );
}

// --- Properties ---

proptest! {
    #[test]
    fn settle_changes_usage_by_exactly_actual(
        before in 0u64..400,
        reserved in 0u64..500,
        actual in 0u64..600,
    ) {
        let budget = TokenBudget::new(BudgetLimits { daily: 10_000, monthly: 100_000, per_run: 1_000 });
        budget.record_usage(before);
        let reservation = budget.reserve(reserved).unwrap();
        reservation.settle(actual);
        let status = budget.status();
        prop_assert_eq!(status.daily_usage, before + actual);
        prop_assert_eq!(status.monthly_usage, before + actual);
    }

    #[test]
    fn release_restores_pre_call_usage(before in 0u64..400, reserved in 0u64..500) {
        let budget = TokenBudget::new(BudgetLimits { daily: 10_000, monthly: 100_000, per_run: 1_000 });
        budget.record_usage(before);
        budget.reserve(reserved).unwrap().release();
        prop_assert_eq!(budget.status().daily_usage, before);
        prop_assert_eq!(budget.status().monthly_usage, before);
    }
}
