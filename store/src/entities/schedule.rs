use serde::Serialize;

use crate::error::StoreError;
use crate::filter::Term;
use crate::record::{push_integer, push_text, Column, Fields, Record, Rule, Table};
use crate::repository::Repository;

/// A rota definition. Every data column is part of the natural key, so two
/// schedules may share a name as long as some other setting differs.
///
/// `start_date` and `end_date` are ids of calendar [`crate::calendar::Date`] rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Schedule {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub shifts_off: i64,
    pub volunteers_per_shift: i64,
    pub start_date: i64,
    pub end_date: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleFields {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub shifts_off: Option<i64>,
    pub volunteers_per_shift: Option<i64>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
}

impl ScheduleFields {
    /// A complete schedule, ready to create.
    pub fn new(
        name: impl Into<String>,
        shifts_off: i64,
        volunteers_per_shift: i64,
        start_date: i64,
        end_date: i64,
    ) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            shifts_off: Some(shifts_off),
            volunteers_per_shift: Some(volunteers_per_shift),
            start_date: Some(start_date),
            end_date: Some(end_date),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
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

impl Fields for ScheduleFields {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        push_text(&mut terms, "name", &self.name);
        push_integer(&mut terms, "shifts_off", self.shifts_off);
        push_integer(&mut terms, "volunteers_per_shift", self.volunteers_per_shift);
        push_integer(&mut terms, "start_date", self.start_date);
        push_integer(&mut terms, "end_date", self.end_date);
        terms
    }
}

impl Table for Schedule {
    const ENTITY: &'static str = "schedule";
    const TABLE: &'static str = "schedules";
    const SELECT: &'static str =
        "id, owner, name, shifts_off, volunteers_per_shift, start_date, end_date";
}

impl Record for Schedule {
    const COLUMNS: &'static [Column] = &[
        Column::new("name", Rule::Text),
        Column::new("shifts_off", Rule::Count),
        Column::new("volunteers_per_shift", Rule::Positive),
        Column::new("start_date", Rule::Positive),
        Column::new("end_date", Rule::Positive),
    ];
    const NATURAL_KEY: &'static [&'static str] = &[
        "name",
        "shifts_off",
        "volunteers_per_shift",
        "start_date",
        "end_date",
    ];
    const ALTERNATE_KEY: &'static [&'static str] = &["name"];

    type Fields = ScheduleFields;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn to_fields(&self) -> ScheduleFields {
        ScheduleFields {
            id: Some(self.id),
            name: Some(self.name.clone()),
            shifts_off: Some(self.shifts_off),
            volunteers_per_shift: Some(self.volunteers_per_shift),
            start_date: Some(self.start_date),
            end_date: Some(self.end_date),
        }
    }
}

impl Repository<Schedule> {
    /// Names of every schedule of `owner`, in creation order.
    pub async fn names(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let schedules = self.request(owner, &[]).await?;
        Ok(schedules.into_iter().map(|s| s.name).collect())
    }
}
