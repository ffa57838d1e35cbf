//! Calendar source for budget rollover.

use chrono::{Local, NaiveDate};

/// Supplies "today" to the budget. Rollover compares against this.
pub trait Clock: Send + Sync {
    /// The current calendar date.
    fn today(&self) -> NaiveDate;
}

/// Wall-clock [`Clock`] in the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
