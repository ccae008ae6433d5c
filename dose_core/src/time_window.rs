//! Time-of-day parsing, day iteration and the grace window.

use crate::{Error, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Default grace window applied when no configuration overrides it
pub const DEFAULT_GRACE_MINUTES: i64 = 30;

/// Parse a strict 24-hour `HH:MM` time of day
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime> {
    let invalid = || Error::InvalidSchedule(format!("time of day {:?} is not HH:MM", raw));

    let (hours, minutes) = raw.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    if !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;

    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(invalid)
}

/// Combine a calendar day and a time of day into a dose instant
pub fn dose_instant(day: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    day.and_time(time)
}

/// Every calendar day in `[start, end]`, inclusive
pub fn days_in_window(
    start: NaiveDate,
    end: NaiveDate,
) -> Result<impl Iterator<Item = NaiveDate>> {
    if end < start {
        return Err(Error::InvalidWindow { start, end });
    }
    Ok(start.iter_days().take_while(move |day| *day <= end))
}

/// How long a pending dose may sit past its instant before it counts as overdue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraceWindow(Duration);

impl GraceWindow {
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn minutes(minutes: i64) -> Self {
        Self(Duration::minutes(minutes))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    /// True only once `now - instant` strictly exceeds the window
    pub fn is_exceeded(&self, instant: NaiveDateTime, now: NaiveDateTime) -> bool {
        now - instant > self.0
    }
}

impl Default for GraceWindow {
    fn default() -> Self {
        Self::minutes(DEFAULT_GRACE_MINUTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_valid_times() {
        assert_eq!(
            parse_time_of_day("00:00").unwrap(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time_of_day("23:59").unwrap(),
            NaiveTime::from_hms_opt(23, 59, 0).unwrap()
        );
        assert_eq!(
            parse_time_of_day("08:05").unwrap(),
            NaiveTime::from_hms_opt(8, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_out_of_range_and_malformed() {
        for raw in ["24:00", "12:60", "8:00", "08:0", "0800", "", "ab:cd", "08:00:00", "+8:00", " 8:00"] {
            assert!(
                matches!(parse_time_of_day(raw), Err(Error::InvalidSchedule(_))),
                "expected {:?} to be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_days_in_window_is_inclusive() {
        let days: Vec<_> = days_in_window(date(2024, 1, 1), date(2024, 1, 7))
            .unwrap()
            .collect();
        assert_eq!(days.len(), 7);
        assert_eq!(days[0], date(2024, 1, 1));
        assert_eq!(days[6], date(2024, 1, 7));
    }

    #[test]
    fn test_single_day_window() {
        let days: Vec<_> = days_in_window(date(2024, 2, 29), date(2024, 2, 29))
            .unwrap()
            .collect();
        assert_eq!(days, vec![date(2024, 2, 29)]);
    }

    #[test]
    fn test_reversed_window() {
        let result = days_in_window(date(2024, 1, 7), date(2024, 1, 1));
        assert!(matches!(result, Err(Error::InvalidWindow { .. })));
    }

    #[test]
    fn test_grace_window_boundary() {
        let grace = GraceWindow::minutes(30);
        let instant = date(2024, 1, 10).and_hms_opt(8, 0, 0).unwrap();

        assert!(!grace.is_exceeded(instant, instant + Duration::minutes(29)));
        assert!(!grace.is_exceeded(instant, instant + Duration::minutes(30)));
        assert!(grace.is_exceeded(instant, instant + Duration::minutes(31)));
        assert!(!grace.is_exceeded(instant, instant - Duration::minutes(5)));
    }
}
