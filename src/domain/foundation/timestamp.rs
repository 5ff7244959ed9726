//! Timestamp value object and calendar arithmetic.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// Adds calendar months, clamping the day to the last valid day of the
/// target month (Jan 31 + 1 month = Feb 28/29, never Mar 2/3).
pub fn add_calendar_months(dt: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    dt.checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Consumes the timestamp, returning the inner DateTime.
    pub fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Creates a new timestamp by adding the specified number of days.
    ///
    /// Negative values subtract days.
    pub fn add_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Creates a new timestamp by subtracting the specified number of days.
    pub fn minus_days(&self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    /// Creates a new timestamp by adding calendar months.
    ///
    /// The day of month is clamped, see [`add_calendar_months`].
    pub fn add_months(&self, months: u32) -> Self {
        Self(add_calendar_months(self.0, months))
    }

    /// RFC 3339 rendering used in API responses and logs.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use proptest::prelude::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 30, 0).unwrap()
    }

    #[test]
    fn jan_31_plus_one_month_clamps_to_feb_28() {
        let next = add_calendar_months(utc(2023, 1, 31), 1);
        assert_eq!((next.year(), next.month(), next.day()), (2023, 2, 28));
    }

    #[test]
    fn jan_31_plus_one_month_in_leap_year_is_feb_29() {
        let next = add_calendar_months(utc(2024, 1, 31), 1);
        assert_eq!((next.year(), next.month(), next.day()), (2024, 2, 29));
    }

    #[test]
    fn mar_31_plus_one_month_is_apr_30() {
        let next = add_calendar_months(utc(2024, 3, 31), 1);
        assert_eq!((next.month(), next.day()), (4, 30));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let next = add_calendar_months(utc(2024, 12, 15), 1);
        assert_eq!((next.year(), next.month(), next.day()), (2025, 1, 15));
    }

    #[test]
    fn time_of_day_is_preserved() {
        let next = add_calendar_months(utc(2024, 5, 31), 1);
        assert_eq!((next.hour(), next.minute()), (12, 30));
    }

    #[test]
    fn timestamp_add_months_uses_calendar_clamp() {
        let ts = Timestamp::from_datetime(utc(2023, 1, 31));
        assert_eq!(ts.add_months(1).as_datetime().day(), 28);
    }

    #[test]
    fn timestamp_ordering_helpers() {
        let earlier = Timestamp::from_datetime(utc(2024, 1, 1));
        let later = earlier.add_days(1);
        assert!(earlier.is_before(&later));
        assert!(later.is_after(&earlier));
        assert_eq!(later.minus_days(1), earlier);
    }

    proptest! {
        #[test]
        fn add_one_month_never_skips_a_month(y in 2000i32..2100, m in 1u32..=12, d in 1u32..=28, extra in 0u32..=3) {
            // Days 28..=31 exercised via `extra`; invalid dates are skipped.
            let day = d + extra;
            if let chrono::LocalResult::Single(start) = Utc.with_ymd_and_hms(y, m, day, 0, 0, 0) {
                let next = add_calendar_months(start, 1);
                let expected_month = if m == 12 { 1 } else { m + 1 };
                prop_assert_eq!(next.month(), expected_month);
                prop_assert!(next.day() <= day);
            }
        }
    }
}
