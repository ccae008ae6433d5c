//! Dose schedule engine for resolving a day's expected doses.
//!
//! Given schedules, the dose records already stored for a day and an
//! explicit reference time, the engine produces one status view per
//! expected dose instant:
//! - Instants with a stored record take the record's status
//! - Instants at or before `now` without a record are pending
//! - Instants after `now` without a record are upcoming
//!
//! Nothing here reads the wall clock or touches storage.

use crate::time_window::{dose_instant, GraceWindow};
use crate::{DoseRecord, DoseState, DoseStatusView, MedicationSchedule, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use uuid::Uuid;

/// Records keyed by the dose instant they belong to
pub type RecordIndex<'a> = HashMap<(Uuid, NaiveDateTime), &'a DoseRecord>;

/// Expand a schedule's times of day into concrete instants on `day`
///
/// Returns instants in the schedule's listed order. Does not check whether
/// the schedule is in effect on `day`.
pub fn expand_dose_instants(
    schedule: &MedicationSchedule,
    day: NaiveDate,
) -> Result<Vec<NaiveDateTime>> {
    Ok(schedule
        .parsed_times()?
        .into_iter()
        .map(|time| dose_instant(day, time))
        .collect())
}

/// Index records by `(schedule_id, scheduled_time)`
///
/// Storage should hold at most one record per instant. If it does not, a
/// terminal record wins over a pending one and otherwise the first seen is kept.
pub fn index_records(records: &[DoseRecord]) -> RecordIndex<'_> {
    let mut index: RecordIndex<'_> = HashMap::with_capacity(records.len());

    for record in records {
        let key = (record.schedule_id, record.scheduled_time);
        match index.get(&key) {
            None => {
                index.insert(key, record);
            }
            Some(existing) => {
                tracing::warn!(
                    "Duplicate dose records for schedule {} at {}",
                    record.schedule_id,
                    record.scheduled_time
                );
                if !existing.status.is_terminal() && record.status.is_terminal() {
                    index.insert(key, record);
                }
            }
        }
    }

    index
}

/// Resolve every expected dose on `day` against `now`
///
/// Every active schedule is validated up front, so a malformed schedule fails
/// the whole call even when it would not produce doses on `day`.
///
/// Results are sorted by instant, then medication name, then schedule id.
pub fn compute_daily_dose_statuses(
    schedules: &[MedicationSchedule],
    records: &[DoseRecord],
    day: NaiveDate,
    now: NaiveDateTime,
    grace: GraceWindow,
) -> Result<Vec<DoseStatusView>> {
    for schedule in schedules.iter().filter(|s| s.is_active) {
        schedule.parsed_times()?;
    }

    let index = index_records(records);
    let mut views = Vec::new();

    for schedule in schedules.iter().filter(|s| s.is_scheduled_on(day)) {
        for instant in expand_dose_instants(schedule, day)? {
            views.push(resolve_view(schedule, instant, &index, now, grace));
        }
    }

    views.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.medication_name.cmp(&b.medication_name))
            .then_with(|| a.schedule_id.cmp(&b.schedule_id))
    });

    tracing::debug!(
        "Resolved {} doses for {} from {} schedules",
        views.len(),
        day,
        schedules.len()
    );

    Ok(views)
}

fn resolve_view(
    schedule: &MedicationSchedule,
    instant: NaiveDateTime,
    index: &RecordIndex<'_>,
    now: NaiveDateTime,
    grace: GraceWindow,
) -> DoseStatusView {
    let status = match index.get(&(schedule.id, instant)) {
        Some(record) => DoseState::from(record.status),
        None if instant <= now => DoseState::Pending,
        None => DoseState::Upcoming,
    };

    let overdue = status == DoseState::Pending && grace.is_exceeded(instant, now);

    DoseStatusView {
        schedule_id: schedule.id,
        medication_name: schedule.medication_name.clone(),
        dosage: schedule.dosage.clone(),
        scheduled_at: instant,
        status,
        overdue,
        minutes_until_due: (instant - now).num_minutes(),
    }
}
