//! Calendar date windows with an inclusive end day.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// An optional `[start, end]` window over calendar days (UTC).
///
/// The end bound covers the whole end day, up to `23:59:59.999999`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, DomainError> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(DomainError::validation(
                    "end_date",
                    "end date is before start date",
                ));
            }
        }
        Ok(Self { start, end })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Parse `YYYY-MM-DD` bounds; blank strings mean "no bound".
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, DomainError> {
        let start = parse_day("start_date", start)?;
        let end = parse_day("end_date", end)?;
        Self::new(start, end)
    }

    pub fn start_bound(&self) -> Option<DateTime<Utc>> {
        self.start.map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    pub fn end_bound(&self) -> Option<DateTime<Utc>> {
        self.end.map(|d| {
            let last_micro = NaiveTime::MIN - TimeDelta::microseconds(1);
            d.and_time(last_micro).and_utc()
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(start) = self.start_bound() {
            if at < start {
                return false;
            }
        }
        if let Some(end) = self.end_bound() {
            if at > end {
                return false;
            }
        }
        true
    }
}

fn parse_day(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, DomainError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| DomainError::validation(field, format!("expected YYYY-MM-DD, got {s:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn end_day_is_inclusive() {
        let range = DateRange::new(Some(day(2024, 1, 1)), Some(day(2024, 1, 31))).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()
            + TimeDelta::microseconds(999_999);
        assert!(range.contains(late));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()));
    }

    #[test]
    fn end_bound_is_last_microsecond() {
        let range = DateRange::new(None, Some(day(2024, 3, 10))).unwrap();
        let end = range.end_bound().unwrap();
        assert_eq!(end.to_rfc3339(), "2024-03-10T23:59:59.999999+00:00");
    }

    #[test]
    fn unbounded_contains_everything() {
        assert!(DateRange::unbounded().contains(Utc::now()));
    }

    #[test]
    fn parse_rejects_bad_dates() {
        match DateRange::parse(Some("2024-13-01"), None) {
            Err(DomainError::Validation { field, .. }) => assert_eq!(field, "start_date"),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(DateRange::parse(Some("2024-02-01"), Some("2024-01-01")).is_err());
        assert_eq!(DateRange::parse(Some(""), None).unwrap(), DateRange::unbounded());
    }
}
