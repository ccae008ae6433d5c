//! Core domain types for medication dose tracking.
//!
//! This module defines the fundamental types used throughout the system:
//! - Medication schedules and their frequencies
//! - Dose records and the status state machine
//! - Derived per-dose status views
//! - Adherence statistics

use crate::{Error, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Schedule Types
// ============================================================================

/// How often a medication is taken
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    TwiceDaily,
    ThreeTimesDaily,
    Weekly,
}

impl Frequency {
    /// Number of time-of-day entries a schedule with this frequency should carry
    pub fn times_per_day(&self) -> usize {
        match self {
            Frequency::Daily | Frequency::Weekly => 1,
            Frequency::TwiceDaily => 2,
            Frequency::ThreeTimesDaily => 3,
        }
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "twice_daily" | "2x_daily" => Ok(Frequency::TwiceDaily),
            "three_times_daily" | "3x_daily" => Ok(Frequency::ThreeTimesDaily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(Error::InvalidSchedule(format!(
                "unknown frequency: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::TwiceDaily => write!(f, "twice_daily"),
            Frequency::ThreeTimesDaily => write!(f, "three_times_daily"),
            Frequency::Weekly => write!(f, "weekly"),
        }
    }
}

/// A medication the user has been asked to take on a recurring schedule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationSchedule {
    pub id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: Frequency,
    /// Local times of day, `HH:MM`
    pub schedule_times: Vec<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl MedicationSchedule {
    /// Create a new active schedule with no date bounds
    pub fn new(
        medication_name: impl Into<String>,
        dosage: impl Into<String>,
        frequency: Frequency,
        schedule_times: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_name: medication_name.into(),
            dosage: dosage.into(),
            frequency,
            schedule_times,
            start_date: None,
            end_date: None,
            is_active: true,
            instructions: None,
        }
    }

    /// Parse and validate every time of day on this schedule
    ///
    /// Fails when the schedule is active but has no times, when a time is
    /// not a 24-hour `HH:MM` value, or when a time appears twice.
    pub fn parsed_times(&self) -> Result<Vec<NaiveTime>> {
        if self.is_active && self.schedule_times.is_empty() {
            return Err(Error::InvalidSchedule(format!(
                "schedule {} ({}) is active but has no schedule times",
                self.id, self.medication_name
            )));
        }

        let mut seen = HashSet::new();
        let mut times = Vec::with_capacity(self.schedule_times.len());
        for raw in &self.schedule_times {
            let time = crate::time_window::parse_time_of_day(raw)?;
            if !seen.insert(time) {
                return Err(Error::InvalidSchedule(format!(
                    "schedule {} ({}) lists {} more than once",
                    self.id, self.medication_name, raw
                )));
            }
            times.push(time);
        }

        if times.len() != self.frequency.times_per_day() {
            tracing::warn!(
                "Schedule {} ({}) is {} but lists {} times",
                self.id,
                self.medication_name,
                self.frequency,
                times.len()
            );
        }

        Ok(times)
    }

    /// Whether `day` falls inside `[start_date, end_date]`, open-ended on either side
    pub fn covers(&self, day: NaiveDate) -> bool {
        let after_start = self.start_date.map_or(true, |start| day >= start);
        let before_end = self.end_date.map_or(true, |end| day <= end);
        after_start && before_end
    }

    /// Whether doses are expected on `day` for a currently active schedule
    pub fn is_scheduled_on(&self, day: NaiveDate) -> bool {
        self.is_active && self.covers(day) && self.recurs_on(day)
    }

    /// Whether doses were expected on `day` when looking back over history
    ///
    /// Deactivated schedules still count up to their end date, so
    /// discontinuing a medication does not erase its adherence record.
    pub fn was_scheduled_on(&self, day: NaiveDate) -> bool {
        let in_service = self.is_active || self.end_date.is_some();
        in_service && self.covers(day) && self.recurs_on(day)
    }

    /// Weekday a weekly schedule falls on
    pub fn weekly_anchor(&self) -> Weekday {
        self.start_date.map_or(Weekday::Mon, |start| start.weekday())
    }

    fn recurs_on(&self, day: NaiveDate) -> bool {
        match self.frequency {
            Frequency::Weekly => day.weekday() == self.weekly_anchor(),
            _ => true,
        }
    }
}

// ============================================================================
// Dose Record Types
// ============================================================================

/// Persisted status of a single dose
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Pending,
    Taken,
    Missed,
    Skipped,
}

impl DoseStatus {
    /// Taken, missed and skipped are final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DoseStatus::Pending)
    }
}

impl fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoseStatus::Pending => write!(f, "pending"),
            DoseStatus::Taken => write!(f, "taken"),
            DoseStatus::Missed => write!(f, "missed"),
            DoseStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// The stored outcome of one scheduled dose instant
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DoseRecord {
    pub id: Uuid,
    /// Weak reference to the owning schedule
    pub schedule_id: Uuid,
    pub scheduled_time: NaiveDateTime,
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,
    pub status: DoseStatus,
}

impl DoseRecord {
    /// Materialize a pending record for a scheduled instant
    pub fn pending(schedule_id: Uuid, scheduled_time: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            scheduled_time,
            taken_at: None,
            status: DoseStatus::Pending,
        }
    }

    /// Move a pending record to a terminal status
    ///
    /// `at` is stored as `taken_at` only when the new status is `Taken`.
    pub fn resolve(&mut self, status: DoseStatus, at: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "dose {} at {} is already {}",
                self.schedule_id, self.scheduled_time, self.status
            )));
        }
        if !status.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "dose {} at {} cannot move back to pending",
                self.schedule_id, self.scheduled_time
            )));
        }

        self.status = status;
        self.taken_at = (status == DoseStatus::Taken).then_some(at);
        Ok(())
    }
}

// ============================================================================
// Derived View Types
// ============================================================================

/// Status shown for a dose instant, including the derived `Upcoming` label
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DoseState {
    Upcoming,
    Pending,
    Taken,
    Missed,
    Skipped,
}

impl From<DoseStatus> for DoseState {
    fn from(status: DoseStatus) -> Self {
        match status {
            DoseStatus::Pending => DoseState::Pending,
            DoseStatus::Taken => DoseState::Taken,
            DoseStatus::Missed => DoseState::Missed,
            DoseStatus::Skipped => DoseState::Skipped,
        }
    }
}

impl fmt::Display for DoseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoseState::Upcoming => write!(f, "upcoming"),
            DoseState::Pending => write!(f, "pending"),
            DoseState::Taken => write!(f, "taken"),
            DoseState::Missed => write!(f, "missed"),
            DoseState::Skipped => write!(f, "skipped"),
        }
    }
}

/// One expected dose on a given day, resolved against a reference time
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DoseStatusView {
    pub schedule_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub scheduled_at: NaiveDateTime,
    pub status: DoseState,
    /// Pending and past the grace window
    pub overdue: bool,
    /// Positive while the dose is still ahead, negative once it is past due
    pub minutes_until_due: i64,
}

// ============================================================================
// Adherence Types
// ============================================================================

/// Dose counts and adherence over a window
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct AdherenceStat {
    pub expected_count: u32,
    pub taken_count: u32,
    pub missed_count: u32,
    pub skipped_count: u32,
    /// Unrounded `taken / expected`
    pub ratio: f64,
    /// `ratio * 100`, rounded to one decimal place
    pub percentage: f64,
}

/// Adherence per medication and overall for one window
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AdherenceReport {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub per_medication: BTreeMap<Uuid, AdherenceStat>,
    pub overall: AdherenceStat,
}
