//! Calendar seeding.
//!
//! The `dates` table is filled once, the first time a database is opened,
//! with one row per day. Row ids therefore count days from the start date:
//! with the default start of 2023-01-01, id 618 is 2024-09-09.

use chrono::{Datelike, Days, NaiveDate};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{StorageContext, StoreError};

/// Rows per INSERT; four bound values each keeps well under SQLite's limit.
const SEED_BATCH: usize = 500;

/// Insert `days` consecutive dates starting at `start` unless `dates`
/// already holds rows. Returns the number of rows inserted.
pub(crate) async fn seed_calendar(
    pool: &SqlitePool,
    start: NaiveDate,
    days: u32,
) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await.context("date", "seed")?;

    let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dates")
        .fetch_one(&mut *tx)
        .await
        .context("date", "seed")?;
    if existing > 0 {
        tracing::debug!(existing, "Calendar already seeded");
        return Ok(0);
    }

    let dates = calendar_days(start, days);
    let mut inserted = 0;
    for chunk in dates.chunks(SEED_BATCH) {
        let mut builder =
            QueryBuilder::<Sqlite>::new("INSERT INTO dates (month, day, year, weekday) ");
        builder.push_values(chunk, |mut row, date| {
            row.push_bind(i64::from(date.month()))
                .push_bind(i64::from(date.day()))
                .push_bind(i64::from(date.year()))
                .push_bind(weekday_name(date));
        });
        inserted += builder
            .build()
            .execute(&mut *tx)
            .await
            .context("date", "seed")?
            .rows_affected();
    }

    tx.commit().await.context("date", "seed")?;
    tracing::info!(days = inserted, start = %start, "Calendar seeded");
    Ok(inserted)
}

/// `days` consecutive dates from `start`, stopping early at the end of
/// chrono's supported range.
fn calendar_days(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..u64::from(days))
        .map_while(|offset| start.checked_add_days(Days::new(offset)))
        .collect()
}

/// English weekday name, matching `weekdays.weekday_name`.
fn weekday_name(date: &NaiveDate) -> String {
    date.format("%A").to_string()
}
