//! Append-only dose log.
//!
//! Every change to a dose record is appended as one JSON line, with file
//! locking to keep concurrent writers from interleaving. The current record
//! for each dose instant is recovered by folding the log with
//! [`resolve_records`].

use crate::{DoseRecord, DoseStatus, Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Record sink trait for persisting dose records
pub trait RecordSink {
    fn append(&mut self, record: &DoseRecord) -> Result<()>;
}

/// JSONL-based record sink with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a new JSONL sink for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl RecordSink for JsonlSink {
    fn append(&mut self, record: &DoseRecord) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;
        let written = write_entry(&file, record);
        file.unlock()?;
        written?;

        tracing::debug!(
            "Appended dose {} ({}) for schedule {} to log",
            record.id,
            record.status,
            record.schedule_id
        );
        Ok(())
    }
}

fn write_entry(file: &File, record: &DoseRecord) -> Result<()> {
    let mut writer = std::io::BufWriter::new(file);
    let line = serde_json::to_string(record)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn parse_entries(reader: impl BufRead) -> Result<Vec<DoseRecord>> {
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<DoseRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Failed to parse dose record at line {}: {}", line_num + 1, e);
            }
        }
    }
    Ok(records)
}

/// Read every entry from a dose log, in append order
pub fn read_records(path: &Path) -> Result<Vec<DoseRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let records = parse_entries(BufReader::new(&file));
    file.unlock()?;
    let records = records?;
    tracing::debug!("Read {} dose log entries", records.len());
    Ok(records)
}

/// Fold log entries into one current record per `(schedule_id, scheduled_time)`
///
/// A terminal entry replaces a pending one. Once an instant is terminal,
/// later entries for it are ignored. Output is ordered by scheduled time.
pub fn resolve_records(entries: Vec<DoseRecord>) -> Vec<DoseRecord> {
    let mut current: HashMap<(Uuid, NaiveDateTime), DoseRecord> = HashMap::new();

    for entry in entries {
        let key = (entry.schedule_id, entry.scheduled_time);
        match current.get(&key) {
            Some(existing) if existing.status.is_terminal() => {
                if existing.status != entry.status {
                    tracing::warn!(
                        "Ignoring {} entry for schedule {} at {}: already {}",
                        entry.status,
                        entry.schedule_id,
                        entry.scheduled_time,
                        existing.status
                    );
                }
            }
            Some(_) if !entry.status.is_terminal() => {}
            _ => {
                current.insert(key, entry);
            }
        }
    }

    let mut records: Vec<_> = current.into_values().collect();
    records.sort_by(|a, b| {
        a.scheduled_time
            .cmp(&b.scheduled_time)
            .then_with(|| a.schedule_id.cmp(&b.schedule_id))
    });
    records
}

/// Load the current records whose scheduled time falls in `[from, to]`
pub fn load_records_between(path: &Path, from: NaiveDate, to: NaiveDate) -> Result<Vec<DoseRecord>> {
    if to < from {
        return Err(Error::InvalidWindow {
            start: from,
            end: to,
        });
    }
    Ok(resolve_records(read_records(path)?)
        .into_iter()
        .filter(|r| {
            let day = r.scheduled_time.date();
            day >= from && day <= to
        })
        .collect())
}

/// Record the outcome of a dose instant
///
/// Looks up the current record for the instant, materializing a pending one
/// if none exists, applies the transition and appends the result. The log
/// stays exclusively locked from the read through the append, so two
/// writers cannot both resolve the same dose. Fails with
/// [`Error::InvalidTransition`] if the dose was already resolved.
pub fn record_dose(
    path: &Path,
    schedule_id: Uuid,
    scheduled_time: NaiveDateTime,
    status: DoseStatus,
    at: DateTime<Utc>,
) -> Result<DoseRecord> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    file.lock_exclusive()?;
    let recorded = resolve_and_append(&file, schedule_id, scheduled_time, status, at);
    file.unlock()?;
    let record = recorded?;

    tracing::info!(
        "Recorded {} for schedule {} at {}",
        status,
        schedule_id,
        scheduled_time
    );
    Ok(record)
}

fn resolve_and_append(
    file: &File,
    schedule_id: Uuid,
    scheduled_time: NaiveDateTime,
    status: DoseStatus,
    at: DateTime<Utc>,
) -> Result<DoseRecord> {
    let mut record = resolve_records(parse_entries(BufReader::new(file))?)
        .into_iter()
        .find(|r| r.schedule_id == schedule_id && r.scheduled_time == scheduled_time)
        .unwrap_or_else(|| DoseRecord::pending(schedule_id, scheduled_time));

    record.resolve(status, at)?;
    write_entry(file, &record)?;
    Ok(record)
}
