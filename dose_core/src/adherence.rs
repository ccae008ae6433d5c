//! Adherence calculation over a historical window.
//!
//! The window is assumed to be fully in the past, so an expected dose
//! without a terminal record counts as missed.

use crate::engine::{expand_dose_instants, index_records};
use crate::time_window::days_in_window;
use crate::{AdherenceReport, AdherenceStat, DoseStatus, MedicationSchedule, DoseRecord, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;

impl AdherenceStat {
    fn count(&mut self, status: Option<DoseStatus>) {
        self.expected_count += 1;
        match status {
            Some(DoseStatus::Taken) => self.taken_count += 1,
            Some(DoseStatus::Skipped) => self.skipped_count += 1,
            Some(DoseStatus::Missed) | Some(DoseStatus::Pending) | None => {
                self.missed_count += 1
            }
        }
    }

    fn absorb(&mut self, other: &AdherenceStat) {
        self.expected_count += other.expected_count;
        self.taken_count += other.taken_count;
        self.missed_count += other.missed_count;
        self.skipped_count += other.skipped_count;
    }

    /// Recompute `ratio` and `percentage` from the counts
    fn finish(&mut self) {
        self.ratio = if self.expected_count == 0 {
            0.0
        } else {
            f64::from(self.taken_count) / f64::from(self.expected_count)
        };
        self.percentage = round_one_decimal(self.ratio * 100.0);
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Compute adherence per schedule and overall for `[window_start, window_end]`
///
/// Deactivated schedules contribute for days up to their end date. Each
/// considered schedule gets an entry, even when nothing was expected of it
/// in the window.
pub fn compute_adherence(
    schedules: &[MedicationSchedule],
    records: &[DoseRecord],
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Result<AdherenceReport> {
    let days: Vec<NaiveDate> = days_in_window(window_start, window_end)?.collect();

    let considered: Vec<&MedicationSchedule> = schedules
        .iter()
        .filter(|s| s.is_active || s.end_date.is_some())
        .collect();

    for schedule in &considered {
        schedule.parsed_times()?;
    }

    let index = index_records(records);
    let mut per_medication: BTreeMap<_, AdherenceStat> = BTreeMap::new();

    for schedule in considered {
        let stat = per_medication.entry(schedule.id).or_default();
        for day in days.iter().copied().filter(|d| schedule.was_scheduled_on(*d)) {
            for instant in expand_dose_instants(schedule, day)? {
                let status = index.get(&(schedule.id, instant)).map(|r| r.status);
                stat.count(status);
            }
        }
    }

    let mut overall = AdherenceStat::default();
    for stat in per_medication.values_mut() {
        stat.finish();
        overall.absorb(stat);
    }
    overall.finish();

    tracing::debug!(
        "Adherence {} to {}: {}/{} taken ({}%)",
        window_start,
        window_end,
        overall.taken_count,
        overall.expected_count,
        overall.percentage
    );

    Ok(AdherenceReport {
        window_start,
        window_end,
        per_medication,
        overall,
    })
}
