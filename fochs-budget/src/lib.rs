#![deny(missing_docs)]
//! Token budget for the fochs agent core.
//!
//! [`TokenBudget`] tracks token spend against daily, monthly and per-run
//! ceilings and owns a kill switch. The router talks to it through the
//! reserve/settle/release protocol: [`TokenBudget::reserve`] hands out a
//! [`Reservation`] that must be settled to the actual usage, and is
//! released automatically if it is dropped unsettled.
//!
//! All mutations take one mutex acquisition and never suspend, so a budget
//! can be shared between concurrently running agent loops.

mod clock;
mod persist;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use clock::{Clock, SystemClock};

/// Default daily ceiling.
pub const DEFAULT_DAILY_LIMIT: u64 = 500_000;
/// Default monthly ceiling.
pub const DEFAULT_MONTHLY_LIMIT: u64 = 10_000_000;
/// Default ceiling for a single agent run.
pub const DEFAULT_PER_RUN_LIMIT: u64 = 50_000;

/// The three ceilings enforced by a [`TokenBudget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLimits {
    /// Tokens allowed per calendar day.
    pub daily: u64,
    /// Tokens allowed per calendar month.
    pub monthly: u64,
    /// Tokens allowed for one agent run.
    pub per_run: u64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            daily: DEFAULT_DAILY_LIMIT,
            monthly: DEFAULT_MONTHLY_LIMIT,
            per_run: DEFAULT_PER_RUN_LIMIT,
        }
    }
}

/// Which ceiling a check tripped over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetScope {
    /// The daily ceiling.
    Daily,
    /// The monthly ceiling.
    Monthly,
}

impl fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetScope::Daily => f.write_str("daily"),
            BudgetScope::Monthly => f.write_str("monthly"),
        }
    }
}

/// Why a reservation was refused.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetError {
    /// The kill switch is tripped.
    #[error("kill switch is active")]
    KillSwitch,

    /// The request would push usage over a ceiling.
    #[error("{scope} budget exceeded: {usage} used + {requested} requested > {limit}")]
    Exceeded {
        /// Ceiling that would be breached.
        scope: BudgetScope,
        /// Usage before the request.
        usage: u64,
        /// Tokens requested.
        requested: u64,
        /// The ceiling.
        limit: u64,
    },
}

/// State of the kill switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSwitch {
    /// Calls are allowed.
    Off,
    /// Tripped automatically by a ceiling overrun. Cleared on a new month.
    Tripped,
    /// Engaged by an operator. Only [`TokenBudget::resume`] clears it.
    Manual,
}

/// Point-in-time view of a budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// Tokens used today.
    pub daily_usage: u64,
    /// Daily ceiling.
    pub daily_limit: u64,
    /// Tokens left today.
    pub daily_remaining: u64,
    /// Tokens used this month.
    pub monthly_usage: u64,
    /// Monthly ceiling.
    pub monthly_limit: u64,
    /// Tokens left this month.
    pub monthly_remaining: u64,
    /// Per-run ceiling.
    pub per_run_limit: u64,
    /// Whether calls are currently refused.
    pub killed: bool,
    /// Kill switch detail.
    pub kill_switch: KillSwitch,
    /// The day the counters belong to.
    pub date: NaiveDate,
}

#[derive(Debug)]
struct BudgetState {
    daily_usage: u64,
    monthly_usage: u64,
    day: NaiveDate,
    month: u32,
    year: i32,
    kill: KillSwitch,
}

impl BudgetState {
    fn fresh(today: NaiveDate) -> Self {
        Self {
            daily_usage: 0,
            monthly_usage: 0,
            day: today,
            month: today.month(),
            year: today.year(),
            kill: KillSwitch::Off,
        }
    }

    fn snapshot(&self) -> persist::Snapshot {
        persist::Snapshot {
            daily_usage: self.daily_usage,
            monthly_usage: self.monthly_usage,
            date: self.day,
            month: self.month,
            year: self.year,
        }
    }
}

/// Tracks token usage and enforces budget limits.
pub struct TokenBudget {
    limits: BudgetLimits,
    clock: Arc<dyn Clock>,
    state_file: Option<PathBuf>,
    state: Mutex<BudgetState>,
}

impl fmt::Debug for TokenBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBudget")
            .field("limits", &self.limits)
            .field("state_file", &self.state_file)
            .finish_non_exhaustive()
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(BudgetLimits::default())
    }
}

impl TokenBudget {
    /// Create a budget on the system clock, without persistence.
    pub fn new(limits: BudgetLimits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    /// Create a budget driven by `clock`.
    pub fn with_clock(limits: BudgetLimits, clock: Arc<dyn Clock>) -> Self {
        let today = clock.today();
        Self {
            limits,
            clock,
            state_file: None,
            state: Mutex::new(BudgetState::fresh(today)),
        }
    }

    /// Persist counters to `path`, restoring whatever is still current.
    ///
    /// Daily usage is restored only if saved today; monthly usage only if
    /// saved in the current month of the current year. A missing or
    /// unreadable file starts from zero.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match persist::load(&path) {
            Ok(Some(saved)) => {
                let today = self.clock.today();
                let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
                if saved.date == today {
                    state.daily_usage = saved.daily_usage;
                }
                if saved.month == today.month() && saved.year == today.year() {
                    state.monthly_usage = saved.monthly_usage;
                }
                tracing::info!(
                    daily_usage = state.daily_usage,
                    monthly_usage = state.monthly_usage,
                    "budget state loaded"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "budget state load failed");
            }
        }
        self.state_file = Some(path);
        self
    }

    /// The configured ceilings.
    pub fn limits(&self) -> BudgetLimits {
        self.limits
    }

    /// Path counters are persisted to, if any.
    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    /// Whether `estimated` more tokens fit under both ceilings.
    ///
    /// False while the kill switch is engaged.
    pub fn check_budget(&self, estimated: u64) -> bool {
        let mut state = self.lock();
        self.rotate(&mut state);
        self.admit(&state, estimated).is_ok()
    }

    /// Whether a single run that has used `run_tokens` is still in budget.
    pub fn check_run_budget(&self, run_tokens: u64) -> bool {
        run_tokens <= self.limits.per_run
    }

    /// Record tokens already spent.
    ///
    /// The usage is always recorded; crossing a ceiling trips the kill
    /// switch for future calls.
    pub fn record_usage(&self, tokens: u64) {
        let mut state = self.lock();
        self.rotate(&mut state);
        state.daily_usage = state.daily_usage.saturating_add(tokens);
        state.monthly_usage = state.monthly_usage.saturating_add(tokens);
        self.trip_if_over(&mut state);
        self.persist(&state);
    }

    /// Atomically check the budget and pre-charge `tokens`.
    ///
    /// The returned [`Reservation`] must be settled to the real usage;
    /// dropping it unsettled gives the tokens back.
    pub fn reserve(&self, tokens: u64) -> Result<Reservation<'_>, BudgetError> {
        let mut state = self.lock();
        self.rotate(&mut state);
        if let Err(e) = self.admit(&state, tokens) {
            tracing::warn!(
                requested = tokens,
                daily_usage = state.daily_usage,
                monthly_usage = state.monthly_usage,
                error = %e,
                "budget reservation refused"
            );
            return Err(e);
        }
        state.daily_usage += tokens;
        state.monthly_usage += tokens;
        self.persist(&state);
        Ok(Reservation {
            budget: self,
            tokens,
            day: state.day,
            open: true,
        })
    }

    /// Emergency stop: refuse every call until [`resume`](Self::resume).
    pub fn kill(&self) {
        self.lock().kill = KillSwitch::Manual;
        tracing::error!("budget kill switch engaged manually, all LLM calls disabled");
    }

    /// Clear the kill switch, whatever engaged it.
    pub fn resume(&self) {
        self.lock().kill = KillSwitch::Off;
        tracing::info!("budget resumed");
    }

    /// Whether calls are currently refused by the kill switch.
    pub fn is_killed(&self) -> bool {
        let mut state = self.lock();
        self.rotate(&mut state);
        state.kill != KillSwitch::Off
    }

    /// Current usage, headroom and kill state, after applying rollover.
    pub fn status(&self) -> BudgetStatus {
        let mut state = self.lock();
        self.rotate(&mut state);
        BudgetStatus {
            daily_usage: state.daily_usage,
            daily_limit: self.limits.daily,
            daily_remaining: self.limits.daily.saturating_sub(state.daily_usage),
            monthly_usage: state.monthly_usage,
            monthly_limit: self.limits.monthly,
            monthly_remaining: self.limits.monthly.saturating_sub(state.monthly_usage),
            per_run_limit: self.limits.per_run,
            killed: state.kill != KillSwitch::Off,
            kill_switch: state.kill,
            date: state.day,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self, state: &BudgetState, estimated: u64) -> Result<(), BudgetError> {
        if state.kill != KillSwitch::Off {
            return Err(BudgetError::KillSwitch);
        }
        if state.daily_usage.saturating_add(estimated) > self.limits.daily {
            return Err(BudgetError::Exceeded {
                scope: BudgetScope::Daily,
                usage: state.daily_usage,
                requested: estimated,
                limit: self.limits.daily,
            });
        }
        if state.monthly_usage.saturating_add(estimated) > self.limits.monthly {
            return Err(BudgetError::Exceeded {
                scope: BudgetScope::Monthly,
                usage: state.monthly_usage,
                requested: estimated,
                limit: self.limits.monthly,
            });
        }
        Ok(())
    }

    fn rotate(&self, state: &mut BudgetState) {
        let today = self.clock.today();
        if today != state.day {
            tracing::info!(previous_usage = state.daily_usage, "budget daily reset");
            state.daily_usage = 0;
            state.day = today;
        }
        if today.month() != state.month || today.year() != state.year {
            tracing::info!(previous_usage = state.monthly_usage, "budget monthly reset");
            state.monthly_usage = 0;
            state.month = today.month();
            state.year = today.year();
            if state.kill == KillSwitch::Tripped {
                tracing::warn!("budget kill switch reset on month boundary");
                state.kill = KillSwitch::Off;
            }
        }
    }

    fn trip_if_over(&self, state: &mut BudgetState) {
        if state.kill != KillSwitch::Off {
            return;
        }
        if state.daily_usage > self.limits.daily {
            tracing::error!(reason = "daily_limit", usage = state.daily_usage, "budget kill switch");
            state.kill = KillSwitch::Tripped;
        } else if state.monthly_usage > self.limits.monthly {
            tracing::error!(reason = "monthly_limit", usage = state.monthly_usage, "budget kill switch");
            state.kill = KillSwitch::Tripped;
        }
    }

    fn persist(&self, state: &BudgetState) {
        if let Some(path) = &self.state_file {
            if let Err(e) = persist::save(path, &state.snapshot()) {
                tracing::warn!(path = %path.display(), error = %e, "budget state save failed");
            }
        }
    }

    /// Swap a reservation made on `day` for the actual usage.
    ///
    /// The reserved tokens only come off counters that still cover `day`;
    /// a counter reset since then never held them.
    fn settle(&self, reserved: u64, actual: u64, day: NaiveDate) {
        let mut state = self.lock();
        self.rotate(&mut state);
        if state.day == day {
            state.daily_usage = state.daily_usage.saturating_sub(reserved);
        }
        if state.month == day.month() && state.year == day.year() {
            state.monthly_usage = state.monthly_usage.saturating_sub(reserved);
        }
        state.daily_usage = state.daily_usage.saturating_add(actual);
        state.monthly_usage = state.monthly_usage.saturating_add(actual);
        self.trip_if_over(&mut state);
        self.persist(&state);
    }
}

/// Tokens pre-charged against a [`TokenBudget`].
///
/// Settle it with the real usage, or release it. An unsettled reservation
/// is released on drop, so cancellation never leaves tokens charged.
#[must_use = "an unsettled reservation is released when dropped"]
#[derive(Debug)]
pub struct Reservation<'a> {
    budget: &'a TokenBudget,
    tokens: u64,
    day: NaiveDate,
    open: bool,
}

impl Reservation<'_> {
    /// Tokens held by this reservation.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Replace the reserved amount with the actual usage.
    pub fn settle(mut self, actual: u64) {
        self.open = false;
        self.budget.settle(self.tokens, actual, self.day);
    }

    /// Give every reserved token back, as if the call never happened.
    pub fn release(mut self) {
        self.open = false;
        self.budget.settle(self.tokens, 0, self.day);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            tracing::debug!(tokens = self.tokens, "releasing dropped budget reservation");
            self.budget.settle(self.tokens, 0, self.day);
        }
    }
}
