use serde::Serialize;

use crate::filter::Term;
use crate::record::{push_integer, push_text, Column, Fields, Record, Rule, Table};

/// A schedule runs on `weekday` (a weekday name such as `"Monday"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct WeekdayLink {
    pub id: i64,
    pub owner: String,
    pub weekday: String,
    pub schedule_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekdayLinkFields {
    pub id: Option<i64>,
    pub weekday: Option<String>,
    pub schedule_id: Option<i64>,
}

impl WeekdayLinkFields {
    pub fn new(weekday: impl Into<String>, schedule_id: i64) -> Self {
        Self {
            id: None,
            weekday: Some(weekday.into()),
            schedule_id: Some(schedule_id),
        }
    }

    pub fn for_schedule(schedule_id: i64) -> Self {
        Self {
            schedule_id: Some(schedule_id),
            ..Default::default()
        }
    }
}

impl Fields for WeekdayLinkFields {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        push_text(&mut terms, "weekday", &self.weekday);
        push_integer(&mut terms, "schedule_id", self.schedule_id);
        terms
    }
}

impl Table for WeekdayLink {
    const ENTITY: &'static str = "weekday link";
    const TABLE: &'static str = "weekdays_for_schedule";
    const SELECT: &'static str = "id, owner, weekday, schedule_id";
}

impl Record for WeekdayLink {
    const COLUMNS: &'static [Column] = &[
        Column::new("weekday", Rule::Text),
        Column::new("schedule_id", Rule::Positive),
    ];
    const NATURAL_KEY: &'static [&'static str] = &["weekday", "schedule_id"];
    const ALTERNATE_KEY: &'static [&'static str] = &["weekday", "schedule_id"];
    const OWNED_REFERENCES: &'static [(&'static str, &'static str)] =
        &[("schedule_id", "schedules")];

    type Fields = WeekdayLinkFields;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn to_fields(&self) -> WeekdayLinkFields {
        WeekdayLinkFields {
            id: Some(self.id),
            weekday: Some(self.weekday.clone()),
            schedule_id: Some(self.schedule_id),
        }
    }
}
