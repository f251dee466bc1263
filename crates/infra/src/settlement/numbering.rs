//! Human-readable order numbers: `PREFIX-YYYYMMDD-NNNNN`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use super::error::SettlementError;

/// Per-day sequential order numbers, unique within the process.
#[derive(Debug)]
pub struct OrderNumberSequence {
    prefix: String,
    counters: Mutex<HashMap<NaiveDate, u32>>,
}

impl OrderNumberSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Next number for the calendar day of `at`. Each day counts from 1.
    pub fn next(&self, at: DateTime<Utc>) -> Result<String, SettlementError> {
        let day = at.date_naive();
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| SettlementError::Infrastructure("order number lock poisoned".to_string()))?;

        let counter = counters.entry(day).or_insert(0);
        *counter += 1;
        let n = *counter;

        Ok(format!("{}-{}-{n:05}", self.prefix, day.format("%Y%m%d")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn numbers_count_per_day() {
        let seq = OrderNumberSequence::new("ORD");
        let d1 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap();

        assert_eq!(seq.next(d1).unwrap(), "ORD-20250301-00001");
        assert_eq!(seq.next(d1).unwrap(), "ORD-20250301-00002");
        assert_eq!(seq.next(d2).unwrap(), "ORD-20250302-00001");
        assert_eq!(seq.next(d1).unwrap(), "ORD-20250301-00003");
    }
}
