//! Read-only lookups into the seeded calendar tables.
//!
//! Weekdays, months and dates are shared by every owner and never change
//! after seeding. Lookups use the same filter rules as the owner-scoped
//! repositories, without the owner term.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{StorageContext, StoreError};
use crate::filter::{build_unscoped_filter, Term};
use crate::record::{push_integer, push_text, Fields, Table};
use crate::repository::select;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Weekday {
    pub id: i64,
    pub weekday_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekdayFilter {
    pub id: Option<i64>,
    pub weekday_name: Option<String>,
}

impl WeekdayFilter {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            weekday_name: Some(name.into()),
        }
    }
}

impl Fields for WeekdayFilter {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        push_text(&mut terms, "weekday_name", &self.weekday_name);
        terms
    }
}

impl Table for Weekday {
    const ENTITY: &'static str = "weekday";
    const TABLE: &'static str = "weekdays";
    const SELECT: &'static str = "id, weekday_name";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Month {
    pub id: i64,
    pub month_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthFilter {
    pub id: Option<i64>,
    pub month_name: Option<String>,
}

impl Fields for MonthFilter {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        push_text(&mut terms, "month_name", &self.month_name);
        terms
    }
}

impl Table for Month {
    const ENTITY: &'static str = "month";
    const TABLE: &'static str = "months";
    const SELECT: &'static str = "id, month_name";
}

/// One calendar day. `month` is a [`Month`] id; `weekday` a weekday name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Date {
    pub id: i64,
    pub month: i64,
    pub day: i64,
    pub year: i64,
    pub weekday: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateFilter {
    pub id: Option<i64>,
    pub month: Option<i64>,
    pub day: Option<i64>,
    pub year: Option<i64>,
    pub weekday: Option<String>,
}

impl DateFilter {
    pub fn ymd(year: i64, month: i64, day: i64) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
            ..Default::default()
        }
    }

    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }
}

impl Fields for DateFilter {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        push_integer(&mut terms, "month", self.month);
        push_integer(&mut terms, "day", self.day);
        push_integer(&mut terms, "year", self.year);
        push_text(&mut terms, "weekday", &self.weekday);
        terms
    }
}

impl Table for Date {
    const ENTITY: &'static str = "date";
    const TABLE: &'static str = "dates";
    const SELECT: &'static str = "id, month, day, year, weekday";
}

/// Lookups over weekdays, months and dates.
#[derive(Clone)]
pub struct Calendar {
    pool: SqlitePool,
}

impl Calendar {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The single weekday matching `filter`. Useful to validate a name.
    pub async fn request_weekday(&self, filter: &WeekdayFilter) -> Result<Weekday, StoreError> {
        self.single(filter).await
    }

    pub async fn request_month(&self, filter: &MonthFilter) -> Result<Month, StoreError> {
        self.single(filter).await
    }

    /// Dates matching any of `filters`, in calendar order.
    ///
    /// Unlike owner-scoped requests an empty slice is rejected: the calendar
    /// is never listed whole.
    pub async fn request_dates(&self, filters: &[DateFilter]) -> Result<Vec<Date>, StoreError> {
        if filters.is_empty() {
            return Err(StoreError::InvalidFilter {
                entity: Date::ENTITY,
                record: "no date filters given".to_string(),
            });
        }
        self.lookup(filters).await
    }

    pub async fn request_date(&self, filter: &DateFilter) -> Result<Date, StoreError> {
        self.single(filter).await
    }

    async fn lookup<T: Table, F: Fields>(&self, filters: &[F]) -> Result<Vec<T>, StoreError> {
        let predicate = build_unscoped_filter(T::ENTITY, filters)?;
        let mut conn = self.pool.acquire().await.context(T::ENTITY, "request")?;
        select::<T>(&mut *conn, &predicate)
            .await
            .context(T::ENTITY, "request")
    }

    async fn single<T: Table, F: Fields>(&self, filter: &F) -> Result<T, StoreError> {
        let mut rows = self.lookup::<T, F>(std::slice::from_ref(filter)).await?;
        if rows.len() != 1 {
            return Err(StoreError::NotExactlyOne {
                entity: T::ENTITY,
                filter: format!("{:?}", filter),
                found: rows.len(),
            });
        }
        Ok(rows.remove(0))
    }
}
