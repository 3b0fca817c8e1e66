//! Quota period-boundary arithmetic (spec §3, §4.C).
//!
//! Hour/day/week have a fixed length and floor trivially via integer
//! division; month does not (28-31 days), so it goes through [`chrono`]
//! calendar arithmetic instead, matching the teacher's convention of reaching
//! for `chrono` rather than hand-rolling calendar math.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};
use gateway_types::QuotaPeriod;

/// Floor of `now_unix` to the start of its accounting period, in unix seconds.
#[must_use]
pub fn period_start(now_unix: u64, period: QuotaPeriod) -> u64 {
    if let Some(len) = period.length_secs() {
        return (now_unix / len) * len;
    }
    let now = unix_to_datetime(now_unix);
    let first_of_month = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    datetime_to_unix(first_of_month)
}

/// The next period boundary strictly after `period_start`, in unix seconds.
#[must_use]
pub fn next_reset(period_start: u64, period: QuotaPeriod) -> u64 {
    if let Some(len) = period.length_secs() {
        return period_start + len;
    }
    let start = unix_to_datetime(period_start);
    let (next_year, next_month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    let next = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(|| start + ChronoDuration::days(30));
    datetime_to_unix(next)
}

fn unix_to_datetime(unix: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::try_from(unix).unwrap_or(i64::MAX), 0).unwrap_or_default()
}

fn datetime_to_unix(dt: DateTime<Utc>) -> u64 {
    u64::try_from(dt.timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_floors_to_the_hour() {
        let now = 1_700_000_123; // arbitrary unix second
        let start = period_start(now, QuotaPeriod::Hour);
        assert_eq!(start % 3600, 0);
        assert!(start <= now);
        assert_eq!(next_reset(start, QuotaPeriod::Hour), start + 3600);
    }

    #[test]
    fn month_crosses_year_boundary() {
        let dec_31 = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        let now = datetime_to_unix(dec_31);
        let start = period_start(now, QuotaPeriod::Month);
        let expected_start = datetime_to_unix(Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(start, expected_start);
        let reset = next_reset(start, QuotaPeriod::Month);
        let expected_reset = datetime_to_unix(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(reset, expected_reset);
    }
}
