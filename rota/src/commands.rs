//! Subcommand handlers. Each prints its result rows as JSON lines.

use std::collections::HashSet;
use std::io::Write;

use chrono::{Datelike, NaiveDate};
use rota_store::calendar::DateFilter;
use rota_store::entities::{ScheduleFields, VolunteerFields};
use rota_store::Store;
use serde::Serialize;

use crate::{Cli, CliError, Command, DateAction, ScheduleAction, VolunteerAction};

/// Outcome of a command that produces a count rather than rows.
#[derive(Debug, Serialize)]
struct Removed {
    removed: u64,
}

pub async fn run(cli: &Cli, store: &Store, out: &mut impl Write) -> anyhow::Result<()> {
    match &cli.command {
        Command::Init => {
            let first = store.calendar.request_date(&DateFilter::with_id(1)).await?;
            tracing::info!(year = first.year, month = first.month, day = first.day, "Database ready");
            emit(out, &[first])
        }
        Command::Volunteers { action } => volunteers(action, &cli.owner()?, store, out).await,
        Command::Schedules { action } => schedules(action, &cli.owner()?, store, out).await,
        Command::Dates { action } => dates(action, store, out).await,
    }
}

async fn volunteers(
    action: &VolunteerAction,
    owner: &str,
    store: &Store,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match action {
        VolunteerAction::List { name } => {
            let filters: Vec<_> = name.iter().map(VolunteerFields::named).collect();
            emit(out, &store.volunteers.request(owner, &filters).await?)
        }
        VolunteerAction::Add { names } => {
            let records: Vec<_> = names.iter().map(VolunteerFields::named).collect();
            emit(out, &store.volunteers.create(owner, &records).await?)
        }
        VolunteerAction::Rename { id, name } => {
            let patch = VolunteerFields {
                id: Some(*id),
                name: Some(name.clone()),
            };
            emit(out, &store.volunteers.update(owner, &[patch]).await?)
        }
        VolunteerAction::Remove { names } => {
            let records: Vec<_> = names.iter().map(VolunteerFields::named).collect();
            let removed = store.volunteers.delete(owner, &records).await?;
            emit(out, &[Removed { removed }])
        }
        VolunteerAction::Prune => {
            let removed = store.volunteers.delete_unassigned(owner).await?;
            emit(out, &[Removed { removed }])
        }
    }
}

async fn schedules(
    action: &ScheduleAction,
    owner: &str,
    store: &Store,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match action {
        ScheduleAction::List { name } => {
            let filters: Vec<_> = name.iter().map(ScheduleFields::named).collect();
            emit(out, &store.schedules.request(owner, &filters).await?)
        }
        ScheduleAction::Names => emit(out, &store.schedules.names(owner).await?),
        ScheduleAction::Add {
            name,
            start,
            end,
            shifts_off,
            volunteers_per_shift,
            weekdays,
            volunteers,
        } => {
            let start = date_id(store, *start).await?;
            let end = date_id(store, *end).await?;

            // Resolve names before writing anything
            let mut volunteer_ids = Vec::with_capacity(volunteers.len());
            for volunteer in volunteers {
                let found = store.volunteers.request(owner, &[VolunteerFields::named(volunteer)]).await?;
                let row = found
                    .first()
                    .ok_or_else(|| CliError::UnknownVolunteer(volunteer.clone()))?;
                volunteer_ids.push(row.id);
            }

            // Repeats on the command line are not repeated links
            let mut seen = HashSet::new();
            let weekdays: Vec<String> = weekdays
                .iter()
                .filter(|day| seen.insert(day.as_str()))
                .cloned()
                .collect();
            let mut seen = HashSet::new();
            volunteer_ids.retain(|id| seen.insert(*id));

            let record = ScheduleFields::new(name, *shifts_off, *volunteers_per_shift, start, end);
            let schedule = store
                .create_schedule(owner, &record, &weekdays, &volunteer_ids)
                .await?;

            tracing::info!(owner, schedule_id = schedule.id, "Schedule created");
            emit(out, &[schedule])
        }
        ScheduleAction::Remove { name } => {
            let removed = store.schedules.delete(owner, &[ScheduleFields::named(name)]).await?;
            emit(out, &[Removed { removed }])
        }
    }
}

async fn dates(action: &DateAction, store: &Store, out: &mut impl Write) -> anyhow::Result<()> {
    match action {
        DateAction::Find {
            year,
            month,
            day,
            weekday,
        } => {
            let filter = DateFilter {
                id: None,
                year: *year,
                month: *month,
                day: *day,
                weekday: weekday.clone(),
            };
            emit(out, &store.calendar.request_dates(&[filter]).await?)
        }
    }
}

async fn date_id(store: &Store, date: NaiveDate) -> anyhow::Result<i64> {
    let filter = DateFilter::ymd(
        i64::from(date.year()),
        i64::from(date.month()),
        i64::from(date.day()),
    );
    match store.calendar.request_date(&filter).await {
        Ok(found) => Ok(found.id),
        Err(rota_store::StoreError::NotExactlyOne { found: 0, .. }) => {
            Err(CliError::UnknownDate(date).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn emit<T: Serialize>(out: &mut impl Write, rows: &[T]) -> anyhow::Result<()> {
    for row in rows {
        serde_json::to_writer(&mut *out, row)?;
        writeln!(out)?;
    }
    Ok(())
}
