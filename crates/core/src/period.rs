//! Inclusive calendar date ranges used by queries and reports.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Inclusive `[from, to]` range of calendar days (UTC).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> DomainResult<Self> {
        if from > to {
            return Err(DomainError::invalid_period(format!(
                "date range starts after it ends ({from} > {to})"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn day(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    /// The full calendar month containing `year`/`month`.
    pub fn month(year: i32, month: u32) -> DomainResult<Self> {
        let from = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| DomainError::invalid_period(format!("invalid month {year}-{month}")))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let to = next
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| DomainError::invalid_period(format!("invalid month {year}-{month}")))?;
        Ok(Self { from, to })
    }

    /// Everything from the beginning of time to the end of time.
    pub fn unbounded() -> Self {
        Self {
            from: NaiveDate::MIN,
            to: NaiveDate::MAX,
        }
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn contains_date(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.contains_date(at.date_naive())
    }

    /// `(year, month)` of the range start.
    pub fn start_month(&self) -> (i32, u32) {
        (self.from.year(), self.from.month())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_covers_every_day() {
        let feb = DateRange::month(2024, 2).unwrap();
        assert_eq!(feb.from(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(feb.to(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let dec = DateRange::month(2025, 12).unwrap();
        assert_eq!(dec.to(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(DateRange::month(2025, 13).is_err());
    }

    #[test]
    fn contains_is_inclusive() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        let range = DateRange::new(d(1), d(3)).unwrap();
        assert!(range.contains_date(d(1)));
        assert!(range.contains_date(d(3)));
        assert!(!range.contains_date(d(4)));
        assert!(range.contains(Utc.with_ymd_and_hms(2025, 3, 3, 23, 59, 59).unwrap()));
        assert!(DateRange::new(d(3), d(1)).is_err());
    }
}
