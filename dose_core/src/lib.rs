#![forbid(unsafe_code)]

//! Core domain model and business logic for medication dose tracking.
//!
//! This crate provides:
//! - Domain types (schedules, dose records, status views, adherence)
//! - Dose schedule engine
//! - Adherence calculator
//! - Persistence (schedule store, dose log, CSV export)
//! - Configuration and logging

pub mod types;
pub mod error;
pub mod time_window;
pub mod engine;
pub mod adherence;
pub mod config;
pub mod logging;
pub mod schedule_store;
pub mod dose_log;
pub mod report_export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use time_window::GraceWindow;
pub use engine::{compute_daily_dose_statuses, expand_dose_instants};
pub use adherence::compute_adherence;
pub use config::Config;
pub use schedule_store::ScheduleBook;
pub use dose_log::{record_dose, JsonlSink, RecordSink};
pub use report_export::write_adherence_csv;
