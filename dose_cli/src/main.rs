use chrono::{Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use dose_core::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "doses")]
#[command(about = "Medication dose reminders and adherence tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this local time instead of the clock (YYYY-MM-DDTHH:MM)
    #[arg(long, global = true, value_parser = parse_local_datetime)]
    now: Option<NaiveDateTime>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a medication schedule
    Add {
        /// Medication name
        name: String,

        /// Dosage, e.g. "10mg"
        dosage: String,

        /// daily, twice_daily, three_times_daily or weekly
        #[arg(long, default_value = "daily")]
        frequency: String,

        /// Time of day (HH:MM), repeat for each dose
        #[arg(long = "time", required = true)]
        times: Vec<String>,

        /// First day of the schedule
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of the schedule
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Free-text instructions
        #[arg(long)]
        instructions: Option<String>,
    },

    /// List schedules
    List {
        /// Include deactivated schedules
        #[arg(long)]
        all: bool,
    },

    /// Discontinue a schedule (history is kept)
    Deactivate {
        /// Schedule id or unique prefix
        schedule: String,

        /// Last day the medication was taken (defaults to today)
        #[arg(long)]
        on: Option<NaiveDate>,
    },

    /// Show the doses for a day (default)
    Today {
        /// Day to show (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Override the configured grace window
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        grace_minutes: Option<i64>,
    },

    /// Mark a dose as taken
    Take(MarkArgs),

    /// Mark a dose as skipped
    Skip(MarkArgs),

    /// Mark a dose as missed
    Miss(MarkArgs),

    /// Report adherence over a window of past days
    Adherence {
        /// First day (defaults to the configured window before --to)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day (defaults to yesterday)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Also write the report to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Args)]
struct MarkArgs {
    /// Schedule id or unique prefix
    schedule: String,

    /// Scheduled time of day of the dose (HH:MM)
    #[arg(long)]
    time: String,

    /// Day of the dose (defaults to today)
    #[arg(long)]
    date: Option<NaiveDate>,
}

fn parse_local_datetime(s: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM: {}", e))
}

/// File locations inside the data directory
struct DataPaths {
    schedules: PathBuf,
    dose_log: PathBuf,
}

impl DataPaths {
    fn new(data_dir: &Path) -> Self {
        Self {
            schedules: data_dir.join("schedules.json"),
            dose_log: data_dir.join("doses.jsonl"),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    dose_core::logging::init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let paths = DataPaths::new(&data_dir);
    let now = cli.now.unwrap_or_else(|| Local::now().naive_local());
    tracing::debug!("Using data dir {:?} at {}", data_dir, now);

    match cli.command {
        Some(Commands::Add {
            name,
            dosage,
            frequency,
            times,
            start,
            end,
            instructions,
        }) => {
            let mut schedule =
                MedicationSchedule::new(name, dosage, frequency.parse::<Frequency>()?, times);
            schedule.start_date = start;
            schedule.end_date = end;
            schedule.instructions = instructions;
            cmd_add(&paths, schedule)
        }
        Some(Commands::List { all }) => cmd_list(&paths, all),
        Some(Commands::Deactivate { schedule, on }) => {
            cmd_deactivate(&paths, &schedule, on.unwrap_or(now.date()))
        }
        Some(Commands::Today {
            date,
            grace_minutes,
        }) => {
            let grace = grace_minutes
                .map(GraceWindow::minutes)
                .unwrap_or_else(|| config.reminders.grace_window());
            cmd_today(&paths, date.unwrap_or(now.date()), now, grace)
        }
        Some(Commands::Take(args)) => cmd_mark(&paths, args, DoseStatus::Taken, now),
        Some(Commands::Skip(args)) => cmd_mark(&paths, args, DoseStatus::Skipped, now),
        Some(Commands::Miss(args)) => cmd_mark(&paths, args, DoseStatus::Missed, now),
        Some(Commands::Adherence { from, to, csv }) => {
            let to = to.unwrap_or(now.date() - Duration::days(1));
            let from = match from {
                Some(from) => from,
                None => default_window_start(to, config.adherence.default_window_days)?,
            };
            cmd_adherence(&paths, from, to, csv.as_deref())
        }
        None => {
            // Default to "today" command
            cmd_today(
                &paths,
                now.date(),
                now,
                config.reminders.grace_window(),
            )
        }
    }
}

fn default_window_start(to: NaiveDate, window_days: i64) -> Result<NaiveDate> {
    Duration::try_days(window_days - 1)
        .and_then(|span| to.checked_sub_signed(span))
        .ok_or_else(|| {
            Error::Config(format!(
                "default_window_days {} reaches before the earliest supported date",
                window_days
            ))
        })
}

fn cmd_add(paths: &DataPaths, schedule: MedicationSchedule) -> Result<()> {
    let added = ScheduleBook::update(&paths.schedules, |book| {
        book.add(schedule.clone())?;
        Ok(schedule)
    })?;

    println!("✓ Added {} {}", added.medication_name, added.dosage);
    println!("  id: {}", added.id);
    println!(
        "  {} at {}",
        added.frequency,
        added.schedule_times.join(", ")
    );
    Ok(())
}

fn cmd_list(paths: &DataPaths, all: bool) -> Result<()> {
    let book = ScheduleBook::load(&paths.schedules)?;
    let schedules: Vec<_> = book
        .schedules
        .iter()
        .filter(|s| all || s.is_active)
        .collect();

    if schedules.is_empty() {
        println!("No medications scheduled.");
        return Ok(());
    }

    for schedule in schedules {
        let state = if schedule.is_active { "" } else { " (inactive)" };
        println!(
            "{}  {} {}{}",
            short_id(schedule),
            schedule.medication_name,
            schedule.dosage,
            state
        );
        println!(
            "          {} at {}",
            schedule.frequency,
            schedule.schedule_times.join(", ")
        );
        if let Some(ref instructions) = schedule.instructions {
            println!("          {}", instructions);
        }
    }
    Ok(())
}

fn cmd_deactivate(paths: &DataPaths, prefix: &str, on: NaiveDate) -> Result<()> {
    let schedule = ScheduleBook::update(&paths.schedules, |book| {
        let id = book.find_by_prefix(prefix)?.id;
        book.deactivate(id, on).cloned()
    })?;

    println!(
        "✓ Deactivated {} {} (last day {})",
        schedule.medication_name,
        schedule.dosage,
        on
    );
    Ok(())
}

fn cmd_today(
    paths: &DataPaths,
    day: NaiveDate,
    now: NaiveDateTime,
    grace: GraceWindow,
) -> Result<()> {
    let book = ScheduleBook::load(&paths.schedules)?;
    let records = dose_core::dose_log::load_records_between(&paths.dose_log, day, day)?;

    let views = compute_daily_dose_statuses(&book.schedules, &records, day, now, grace)?;

    println!("Doses for {} (as of {})", day, now.format("%Y-%m-%d %H:%M"));
    if views.is_empty() {
        println!("  Nothing scheduled.");
        return Ok(());
    }

    for view in &views {
        println!(
            "  {}  {:<8}  {} {}  {}",
            view.scheduled_at.format("%H:%M"),
            &view.schedule_id.to_string()[..8],
            view.medication_name,
            view.dosage,
            describe(view)
        );
    }
    Ok(())
}

fn describe(view: &DoseStatusView) -> String {
    match view.status {
        DoseState::Upcoming => format!("upcoming (in {} min)", view.minutes_until_due),
        DoseState::Pending if view.overdue => {
            format!("OVERDUE ({} min past due)", -view.minutes_until_due)
        }
        DoseState::Pending => format!("due now ({} min past due)", -view.minutes_until_due),
        other => other.to_string(),
    }
}

fn cmd_mark(paths: &DataPaths, args: MarkArgs, status: DoseStatus, now: NaiveDateTime) -> Result<()> {
    let book = ScheduleBook::load(&paths.schedules)?;
    let schedule = book.find_by_prefix(&args.schedule)?;
    let day = args.date.unwrap_or(now.date());

    let time = dose_core::time_window::parse_time_of_day(&args.time)?;
    if !schedule.parsed_times()?.contains(&time) {
        return Err(Error::NotFound(format!(
            "{} is not scheduled at {}",
            schedule.medication_name, args.time
        )));
    }
    if !schedule.was_scheduled_on(day) {
        return Err(Error::NotFound(format!(
            "{} is not scheduled on {}",
            schedule.medication_name, day
        )));
    }

    let at = Local
        .from_local_datetime(&now)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let instant = dose_core::time_window::dose_instant(day, time);
    record_dose(&paths.dose_log, schedule.id, instant, status, at)?;

    println!(
        "✓ {} {} at {} marked {}",
        schedule.medication_name,
        schedule.dosage,
        instant.format("%Y-%m-%d %H:%M"),
        status
    );
    Ok(())
}

fn cmd_adherence(paths: &DataPaths, from: NaiveDate, to: NaiveDate, csv: Option<&Path>) -> Result<()> {
    let book = ScheduleBook::load(&paths.schedules)?;
    let records = dose_core::dose_log::load_records_between(&paths.dose_log, from, to)?;

    let report = compute_adherence(&book.schedules, &records, from, to)?;

    println!("Adherence {} to {}", from, to);
    for (id, stat) in &report.per_medication {
        let name = book
            .find(*id)
            .map(|s| format!("{} {}", s.medication_name, s.dosage))
            .unwrap_or_else(|| id.to_string());
        println!("  {}", format_stat(&name, stat));
    }
    println!("  {}", format_stat("Overall", &report.overall));

    if let Some(path) = csv {
        write_adherence_csv(&report, &book.schedules, path)?;
        println!("  CSV: {}", path.display());
    }
    Ok(())
}

fn format_stat(label: &str, stat: &AdherenceStat) -> String {
    format!(
        "{}: {:.1}% ({}/{} taken, {} missed, {} skipped)",
        label,
        stat.percentage,
        stat.taken_count,
        stat.expected_count,
        stat.missed_count,
        stat.skipped_count
    )
}

fn short_id(schedule: &MedicationSchedule) -> String {
    schedule.id.to_string()[..8].to_string()
}
