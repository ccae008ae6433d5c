//! Medication schedule persistence with file locking.
//!
//! Schedules are kept in a single JSON document. Reads take a shared lock;
//! writes go through a locked temp file that is renamed over the original.
//! Read-modify-write cycles hold an exclusive lock on a `<file>.lock`
//! sidecar, since the rename replaces the document's inode.

use crate::{Error, MedicationSchedule, Result};
use chrono::NaiveDate;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Every schedule the user has created, active or not
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ScheduleBook {
    pub schedules: Vec<MedicationSchedule>,
}

impl ScheduleBook {
    /// Load schedules from a file with shared locking
    ///
    /// Returns an empty book if the file doesn't exist. A file that exists but
    /// cannot be parsed is an error, since saving over it would lose schedules.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No schedule file found at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let book: ScheduleBook = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded {} schedules from {:?}", book.schedules.len(), path);
        Ok(book)
    }

    /// Save schedules to a file with exclusive locking
    ///
    /// Atomically writes by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "schedule path missing parent")
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} schedules to {:?}", self.schedules.len(), path);
        Ok(())
    }

    /// Load schedules, modify them, and save them back
    ///
    /// The whole cycle runs under an exclusive lock on the sidecar lock file,
    /// so concurrent updates are applied one after another.
    pub fn update<F, T>(path: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut ScheduleBook) -> Result<T>,
    {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path(path))?;
        lock.lock_exclusive()?;

        let updated = Self::load(path).and_then(|mut book| {
            let out = f(&mut book)?;
            book.save(path)?;
            Ok(out)
        });

        lock.unlock()?;
        updated
    }

    /// Add a schedule after validating its times
    pub fn add(&mut self, schedule: MedicationSchedule) -> Result<()> {
        schedule.parsed_times()?;
        if self.find(schedule.id).is_some() {
            return Err(Error::InvalidSchedule(format!(
                "schedule {} already exists",
                schedule.id
            )));
        }
        tracing::info!(
            "Added schedule {} ({} {})",
            schedule.id,
            schedule.medication_name,
            schedule.dosage
        );
        self.schedules.push(schedule);
        Ok(())
    }

    pub fn find(&self, id: Uuid) -> Option<&MedicationSchedule> {
        self.schedules.iter().find(|s| s.id == id)
    }

    /// Resolve a full id or a unique id prefix
    pub fn find_by_prefix(&self, prefix: &str) -> Result<&MedicationSchedule> {
        let prefix = prefix.to_lowercase();
        let mut matches = self
            .schedules
            .iter()
            .filter(|s| s.id.to_string().starts_with(&prefix));

        match (matches.next(), matches.next()) {
            (Some(schedule), None) => Ok(schedule),
            (None, _) => Err(Error::NotFound(format!("schedule {}", prefix))),
            (Some(_), Some(_)) => Err(Error::NotFound(format!(
                "schedule prefix {} is ambiguous",
                prefix
            ))),
        }
    }

    /// Discontinue a schedule without deleting it
    ///
    /// Sets `end_date` to `on` unless an earlier end date is already recorded,
    /// so the schedule keeps counting toward adherence up to that day.
    pub fn deactivate(&mut self, id: Uuid, on: NaiveDate) -> Result<&MedicationSchedule> {
        let schedule = self
            .schedules
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("schedule {}", id)))?;

        schedule.is_active = false;
        schedule.end_date = Some(schedule.end_date.map_or(on, |end| end.min(on)));

        tracing::info!(
            "Deactivated schedule {} ({}) as of {}",
            schedule.id,
            schedule.medication_name,
            on
        );
        Ok(&*schedule)
    }

    /// Schedules still in effect
    pub fn active(&self) -> impl Iterator<Item = &MedicationSchedule> {
        self.schedules.iter().filter(|s| s.is_active)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frequency;

    fn lisinopril() -> MedicationSchedule {
        MedicationSchedule::new("Lisinopril", "10mg", Frequency::Daily, vec!["08:00".into()])
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("schedules.json");

        let mut book = ScheduleBook::default();
        let mut schedule = lisinopril();
        schedule.instructions = Some("With breakfast".into());
        book.add(schedule.clone()).unwrap();
        book.save(&path).unwrap();

        let loaded = ScheduleBook::load(&path).unwrap();
        assert_eq!(loaded.schedules.len(), 1);
        assert_eq!(loaded.schedules[0], schedule);
    }

    #[test]
    fn test_load_nonexistent_returns_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let book = ScheduleBook::load(&temp_dir.path().join("missing.json")).unwrap();
        assert!(book.schedules.is_empty());
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("schedules.json");
        std::fs::write(&path, "{ invalid json }").unwrap();

        assert!(matches!(ScheduleBook::load(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_add_rejects_invalid_schedule() {
        let mut book = ScheduleBook::default();
        let schedule =
            MedicationSchedule::new("Lisinopril", "10mg", Frequency::Daily, vec!["25:99".into()]);

        assert!(book.add(schedule).is_err());
        assert!(book.schedules.is_empty());
    }

    #[test]
    fn test_deactivate_keeps_schedule() {
        let mut book = ScheduleBook::default();
        let schedule = lisinopril();
        let id = schedule.id;
        book.add(schedule).unwrap();

        book.deactivate(id, date(2024, 1, 10)).unwrap();

        assert_eq!(book.schedules.len(), 1);
        let stored = book.find(id).unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.end_date, Some(date(2024, 1, 10)));
        assert_eq!(book.active().count(), 0);
    }

    #[test]
    fn test_deactivate_keeps_earlier_end_date() {
        let mut book = ScheduleBook::default();
        let mut schedule = lisinopril();
        schedule.end_date = Some(date(2024, 1, 5));
        let id = schedule.id;
        book.add(schedule).unwrap();

        book.deactivate(id, date(2024, 1, 10)).unwrap();
        assert_eq!(book.find(id).unwrap().end_date, Some(date(2024, 1, 5)));
    }

    #[test]
    fn test_deactivate_unknown_schedule() {
        let mut book = ScheduleBook::default();
        let result = book.deactivate(Uuid::new_v4(), date(2024, 1, 10));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_find_by_prefix() {
        let mut book = ScheduleBook::default();
        let schedule = lisinopril();
        let id = schedule.id;
        book.add(schedule).unwrap();

        let prefix = &id.to_string()[..8];
        assert_eq!(book.find_by_prefix(prefix).unwrap().id, id);
        assert!(book.find_by_prefix("zzzz").is_err());
    }

    #[test]
    fn test_update_pattern() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("schedules.json");

        ScheduleBook::update(&path, |book| book.add(lisinopril())).unwrap();
        ScheduleBook::update(&path, |book| book.add(lisinopril())).unwrap();

        let loaded = ScheduleBook::load(&path).unwrap();
        assert_eq!(loaded.schedules.len(), 2);
    }

    #[test]
    fn test_concurrent_updates_keep_every_schedule() {
        use std::sync::{Arc, Barrier};

        for _ in 0..10 {
            let temp_dir = tempfile::tempdir().unwrap();
            let path = temp_dir.path().join("schedules.json");
            let barrier = Arc::new(Barrier::new(4));

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let barrier = Arc::clone(&barrier);
                    let path = path.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        ScheduleBook::update(&path, |book| book.add(lisinopril())).unwrap();
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(ScheduleBook::load(&path).unwrap().schedules.len(), 4);
        }
    }

    #[test]
    fn test_failed_update_leaves_file_untouched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("schedules.json");
        ScheduleBook::update(&path, |book| book.add(lisinopril())).unwrap();

        let result = ScheduleBook::update(&path, |book| {
            book.deactivate(Uuid::new_v4(), date(2024, 1, 10)).map(|_| ())
        });
        assert!(matches!(result, Err(Error::NotFound(_))));

        let loaded = ScheduleBook::load(&path).unwrap();
        assert!(loaded.schedules[0].is_active);
    }

    #[test]
    fn test_atomic_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("schedules.json");

        ScheduleBook::default().save(&path).unwrap();

        // Verify schedule file exists and no stray temp files remain
        assert!(path.exists());
        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "schedules.json")
            .collect();
        assert!(
            extras.is_empty(),
            "Expected only schedules.json, found extras: {:?}",
            extras
        );
    }
}
