use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::store::HolidayCalendar;
use crate::DayOfWeek;

/// Calendar days expected between consecutive extracts, keyed by the weekday
/// of the run, plus the weekdays on which no run is triggered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SchedulePolicy {
    #[serde(default)]
    pub offsets: BTreeMap<DayOfWeek, i64>,
    #[serde(default = "default_no_run_days")]
    pub no_run_days: Vec<DayOfWeek>,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            offsets: BTreeMap::new(),
            no_run_days: default_no_run_days(),
        }
    }
}

impl SchedulePolicy {
    /// Days to add to the previous extract date for a run on `weekday`.
    /// Configured offsets override the reference table day by day.
    #[must_use]
    pub fn compute_offset(&self, weekday: DayOfWeek) -> i64 {
        self.offsets
            .get(&weekday)
            .copied()
            .unwrap_or_else(|| reference_offset(weekday))
    }

    #[must_use]
    pub fn is_no_run_day(&self, weekday: DayOfWeek) -> bool {
        self.no_run_days.contains(&weekday)
    }

    /// Returns the holiday that blocks a run on `run_date`, if any.
    ///
    /// # Errors
    /// Propagates calendar lookup failures.
    pub fn holiday_gate(
        &self,
        calendar: &dyn HolidayCalendar,
        run_date: Date,
    ) -> anyhow::Result<Option<Date>> {
        calendar.holiday_for(run_date)
    }

    /// # Errors
    /// Propagates calendar lookup failures.
    pub fn is_holiday(&self, calendar: &dyn HolidayCalendar, run_date: Date) -> anyhow::Result<bool> {
        Ok(self.holiday_gate(calendar, run_date)?.is_some())
    }
}

/// Reference weekday gaps: one business day mid-week, two after the weekend
/// (Sunday run), three after the skipped Monday (Tuesday run).
#[must_use]
pub fn reference_offset(weekday: DayOfWeek) -> i64 {
    match weekday {
        DayOfWeek::Sunday => 2,
        DayOfWeek::Tuesday => 3,
        DayOfWeek::Monday
        | DayOfWeek::Wednesday
        | DayOfWeek::Thursday
        | DayOfWeek::Friday
        | DayOfWeek::Saturday => 1,
    }
}

fn default_no_run_days() -> Vec<DayOfWeek> {
    vec![DayOfWeek::Monday]
}
