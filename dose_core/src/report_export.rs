//! CSV export of adherence reports.

use crate::{AdherenceReport, AdherenceStat, MedicationSchedule, Result};
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    schedule_id: String,
    medication: &'a str,
    dosage: &'a str,
    window_start: String,
    window_end: String,
    expected: u32,
    taken: u32,
    missed: u32,
    skipped: u32,
    percentage: f64,
}

impl<'a> CsvRow<'a> {
    fn new(
        report: &AdherenceReport,
        schedule_id: String,
        medication: &'a str,
        dosage: &'a str,
        stat: &AdherenceStat,
    ) -> Self {
        CsvRow {
            schedule_id,
            medication,
            dosage,
            window_start: report.window_start.to_string(),
            window_end: report.window_end.to_string(),
            expected: stat.expected_count,
            taken: stat.taken_count,
            missed: stat.missed_count,
            skipped: stat.skipped_count,
            percentage: stat.percentage,
        }
    }
}

/// Write an adherence report as CSV, one row per medication plus an `overall` row
///
/// Schedules missing from `schedules` are still written, with blank names.
/// Returns the number of rows written, excluding the header.
pub fn write_adherence_csv(
    report: &AdherenceReport,
    schedules: &[MedicationSchedule],
    path: &Path,
) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(file);

    let mut rows = 0;
    for (id, stat) in &report.per_medication {
        let schedule = schedules.iter().find(|s| s.id == *id);
        let (medication, dosage) = schedule
            .map(|s| (s.medication_name.as_str(), s.dosage.as_str()))
            .unwrap_or(("", ""));
        writer.serialize(CsvRow::new(report, id.to_string(), medication, dosage, stat))?;
        rows += 1;
    }

    writer.serialize(CsvRow::new(
        report,
        "overall".into(),
        "",
        "",
        &report.overall,
    ))?;
    rows += 1;

    writer.flush()?;
    tracing::info!("Wrote {} adherence rows to {:?}", rows, path);
    Ok(rows)
}
