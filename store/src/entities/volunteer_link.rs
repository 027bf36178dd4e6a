use serde::Serialize;

use crate::filter::Term;
use crate::record::{push_integer, Column, Fields, Record, Rule, Table};

/// A volunteer takes part in a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct VolunteerLink {
    pub id: i64,
    pub owner: String,
    pub schedule_id: i64,
    pub volunteer_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolunteerLinkFields {
    pub id: Option<i64>,
    pub schedule_id: Option<i64>,
    pub volunteer_id: Option<i64>,
}

impl VolunteerLinkFields {
    pub fn new(schedule_id: i64, volunteer_id: i64) -> Self {
        Self {
            id: None,
            schedule_id: Some(schedule_id),
            volunteer_id: Some(volunteer_id),
        }
    }

    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }
}

impl Fields for VolunteerLinkFields {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        push_integer(&mut terms, "schedule_id", self.schedule_id);
        push_integer(&mut terms, "volunteer_id", self.volunteer_id);
        terms
    }
}

impl Table for VolunteerLink {
    const ENTITY: &'static str = "volunteer link";
    const TABLE: &'static str = "volunteers_for_schedule";
    const SELECT: &'static str = "id, owner, schedule_id, volunteer_id";
}

impl Record for VolunteerLink {
    const COLUMNS: &'static [Column] = &[
        Column::new("schedule_id", Rule::Positive),
        Column::new("volunteer_id", Rule::Positive),
    ];
    const NATURAL_KEY: &'static [&'static str] = &["schedule_id", "volunteer_id"];
    const ALTERNATE_KEY: &'static [&'static str] = &["schedule_id", "volunteer_id"];
    const OWNED_REFERENCES: &'static [(&'static str, &'static str)] =
        &[("schedule_id", "schedules"), ("volunteer_id", "volunteers")];

    type Fields = VolunteerLinkFields;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn to_fields(&self) -> VolunteerLinkFields {
        VolunteerLinkFields {
            id: Some(self.id),
            schedule_id: Some(self.schedule_id),
            volunteer_id: Some(self.volunteer_id),
        }
    }
}
