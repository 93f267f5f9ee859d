use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};
use crate::models::YEARS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Week,
    Month,
}

impl FromStr for ViewMode {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(ViewMode::Week),
            "month" => Ok(ViewMode::Month),
            _ => Err(PlanError::validation(
                "view",
                format!("'{s}' is not one of: week, month"),
            )),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewMode::Week => "week",
            ViewMode::Month => "month",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// Inclusive `[start, end]` span of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> PlanResult<Self> {
        if start > end {
            return Err(PlanError::validation(
                "start_date",
                format!("{start} is after end_date {end}"),
            ));
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Week views run Sunday through Saturday; month views cover the
    /// anchor's whole month. Fails when the range would leave the calendar.
    pub fn resolve(anchor: NaiveDate, view: ViewMode) -> PlanResult<Self> {
        let out_of_range = || PlanError::validation("anchor", format!("{anchor} is out of range"));
        match view {
            ViewMode::Week => {
                let back = u64::from(anchor.weekday().num_days_from_sunday());
                let start = anchor.checked_sub_days(Days::new(back)).ok_or_else(out_of_range)?;
                let end = start.checked_add_days(Days::new(6)).ok_or_else(out_of_range)?;
                Ok(Self { start, end })
            }
            ViewMode::Month => {
                let start = anchor.with_day(1).ok_or_else(out_of_range)?;
                let end = start
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .ok_or_else(out_of_range)?;
                Ok(Self { start, end })
            }
        }
    }

    /// Shift an anchor to the neighbouring week or month. Month moves clamp
    /// the day to the target month's length (Jan 31 -> Feb 29). Moves that
    /// would leave years 1 to 9999 keep the anchor.
    #[must_use]
    pub fn navigate(anchor: NaiveDate, view: ViewMode, direction: Direction) -> NaiveDate {
        let moved = match (view, direction) {
            (ViewMode::Week, Direction::Previous) => anchor.checked_sub_days(Days::new(7)),
            (ViewMode::Week, Direction::Next) => anchor.checked_add_days(Days::new(7)),
            (ViewMode::Month, Direction::Previous) => anchor.checked_sub_months(Months::new(1)),
            (ViewMode::Month, Direction::Next) => anchor.checked_add_months(Months::new(1)),
        };
        moved
            .filter(|d| YEARS.contains(&d.year()))
            .unwrap_or(anchor)
    }

    /// Number of dates in the range, both ends counted.
    #[must_use]
    pub fn day_count(&self) -> u64 {
        (self.end - self.start).num_days().unsigned_abs() + 1
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    #[must_use]
    pub fn union(&self, other: &DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
