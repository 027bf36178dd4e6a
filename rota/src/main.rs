//! `rota` command-line front end for the rota store.
//!
//! Every subcommand opens the database (creating and seeding it on first
//! use), runs one store operation and prints the resulting rows as JSON
//! lines on stdout. Logs go to stderr and are filtered with `RUST_LOG`.
//!
//! The owner of volunteer and schedule rows comes from `--user`, then
//! `ROTA_USER`, then `USER`. See [`rota_store::config`] for the other
//! environment variables.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rota_store::config::{self, StoreConfig};
use rota_store::{Database, Store};

mod commands;

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "rota", about = "Volunteer rota bookkeeping")]
struct Cli {
    /// Owner whose rows are read and written.
    #[arg(long, global = true)]
    user: Option<String>,

    /// Database file. Defaults to `rota.db` in the data directory.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and seed the calendar.
    Init,
    /// Manage volunteers.
    Volunteers {
        #[command(subcommand)]
        action: VolunteerAction,
    },
    /// Manage schedules.
    Schedules {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Query the calendar.
    Dates {
        #[command(subcommand)]
        action: DateAction,
    },
}

#[derive(Subcommand, Debug)]
enum VolunteerAction {
    /// List volunteers, optionally only the one with this name.
    List { name: Option<String> },
    /// Add one volunteer per name.
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Give the volunteer with `id` a new name.
    Rename { id: i64, name: String },
    /// Remove volunteers by name.
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Remove volunteers not linked to any schedule.
    Prune,
}

#[derive(Subcommand, Debug)]
enum ScheduleAction {
    /// List schedules, optionally only those with this name.
    List { name: Option<String> },
    /// Print schedule names only.
    Names,
    /// Create a schedule and link its weekdays and volunteers.
    Add {
        name: String,
        /// First day, as YYYY-MM-DD.
        #[arg(long)]
        start: NaiveDate,
        /// Last day, as YYYY-MM-DD.
        #[arg(long)]
        end: NaiveDate,
        /// Shifts a volunteer rests between two shifts.
        #[arg(long, default_value_t = 1)]
        shifts_off: i64,
        #[arg(long, default_value_t = 1)]
        volunteers_per_shift: i64,
        /// Weekday the rota runs on. Repeat for several.
        #[arg(long = "weekday")]
        weekdays: Vec<String>,
        /// Existing volunteer to put on the rota. Repeat for several.
        #[arg(long = "volunteer")]
        volunteers: Vec<String>,
    },
    /// Remove every schedule with this name, with its links.
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
enum DateAction {
    /// Dates matching every given field.
    Find {
        #[arg(long)]
        year: Option<i64>,
        #[arg(long)]
        month: Option<i64>,
        #[arg(long)]
        day: Option<i64>,
        #[arg(long)]
        weekday: Option<String>,
    },
}

/// Error type for CLI operations.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("no owner given: pass --user or set ROTA_USER")]
    MissingOwner,

    #[error("no volunteer named {0:?}")]
    UnknownVolunteer(String),

    #[error("no calendar date {0}")]
    UnknownDate(NaiveDate),
}

impl Cli {
    fn owner(&self) -> Result<String, CliError> {
        self.user
            .clone()
            .filter(|user| !user.is_empty())
            .or_else(config::get_default_owner)
            .ok_or(CliError::MissingOwner)
    }

    fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(config::get_database_path)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = cli.database_path();
    tracing::debug!(database = %path.display(), "Opening database");

    let db = Database::open(&path, &StoreConfig::from_env()).await?;
    let store = Store::new(&db);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::run(&cli, &store, &mut out).await?;

    db.pool().close().await;
    Ok(())
}
