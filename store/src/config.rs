//! Configuration for the rota store.
//!
//! Handles the data directory with the following precedence:
//! 1. ROTA_DATA_DIR environment variable
//! 2. ~/.config/rota/data (production default)
//! 3. ./data (fallback for development)
//!
//! Store behaviour (zero shifts off mode, calendar span) is read from the
//! environment into a [`StoreConfig`], which tests build directly instead.

use std::path::PathBuf;

use chrono::NaiveDate;

const DEFAULT_CONFIG_DIR: &str = ".config/rota/data";
const DEV_DATA_DIR: &str = "./data";
const DATABASE_FILE: &str = "rota.db";

/// First day of the seeded calendar.
pub const DEFAULT_CALENDAR_START: &str = "2023-01-01";

/// Number of seeded days: forty years of 365.25 days.
pub const DEFAULT_CALENDAR_DAYS: u32 = 14_610;

/// Get the data directory for persistence.
///
/// Priority:
/// 1. ROTA_DATA_DIR env variable if set
/// 2. $HOME/.config/rota/data if HOME is set
/// 3. ./data as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ROTA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

/// Get the database file path.
///
/// `ROTA_DATABASE` wins if set, otherwise `rota.db` inside [`get_data_dir`].
pub fn get_database_path() -> PathBuf {
    if let Ok(path) = std::env::var("ROTA_DATABASE") {
        return PathBuf::from(path);
    }

    get_data_dir().join(DATABASE_FILE)
}

/// Get the owner used when the caller names none.
///
/// Priority:
/// 1. ROTA_USER env variable if set
/// 2. USER env variable if set
pub fn get_default_owner() -> Option<String> {
    std::env::var("ROTA_USER")
        .or_else(|_| std::env::var("USER"))
        .ok()
        .filter(|owner| !owner.is_empty())
}

/// Whether schedules may be stored with zero shifts off.
///
/// Reads `ROTA_ALLOW_ZERO_SHIFTS_OFF`; `1`, `true` and `yes` enable it.
pub fn get_allow_zero_shifts_off() -> bool {
    std::env::var("ROTA_ALLOW_ZERO_SHIFTS_OFF")
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

/// First calendar day, from `ROTA_CALENDAR_START` (`YYYY-MM-DD`).
/// Unparseable values fall back to the default.
pub fn get_calendar_start() -> NaiveDate {
    std::env::var("ROTA_CALENDAR_START")
        .ok()
        .and_then(|v| parse_date(&v))
        .unwrap_or_else(default_calendar_start)
}

/// Calendar span in days, from `ROTA_CALENDAR_DAYS`.
pub fn get_calendar_days() -> u32 {
    if let Ok(days) = std::env::var("ROTA_CALENDAR_DAYS") {
        return days.parse().unwrap_or(DEFAULT_CALENDAR_DAYS);
    }

    DEFAULT_CALENDAR_DAYS
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn default_calendar_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Settings the store needs when opening a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub allow_zero_shifts_off: bool,
    pub calendar_start: NaiveDate,
    pub calendar_days: u32,
}

impl StoreConfig {
    /// Build the configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            allow_zero_shifts_off: get_allow_zero_shifts_off(),
            calendar_start: get_calendar_start(),
            calendar_days: get_calendar_days(),
        }
    }

    /// Shorten the seeded calendar. Tests use a few years to keep setup fast.
    pub fn with_calendar_days(mut self, days: u32) -> Self {
        self.calendar_days = days;
        self
    }

    pub fn with_zero_shifts_off(mut self, allow: bool) -> Self {
        self.allow_zero_shifts_off = allow;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            allow_zero_shifts_off: false,
            calendar_start: default_calendar_start(),
            calendar_days: DEFAULT_CALENDAR_DAYS,
        }
    }
}
