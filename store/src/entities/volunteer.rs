use serde::Serialize;

use crate::error::{StorageContext, StoreError};
use crate::filter::Term;
use crate::record::{push_text, Column, Fields, Record, Rule, Table};
use crate::repository::Repository;

/// A person who can be put on a schedule. Names are unique per owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Volunteer {
    pub id: i64,
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolunteerFields {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl VolunteerFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }
}

impl Fields for VolunteerFields {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        push_text(&mut terms, "name", &self.name);
        terms
    }
}

impl Table for Volunteer {
    const ENTITY: &'static str = "volunteer";
    const TABLE: &'static str = "volunteers";
    const SELECT: &'static str = "id, owner, name";
}

impl Record for Volunteer {
    const COLUMNS: &'static [Column] = &[Column::new("name", Rule::Text)];
    const NATURAL_KEY: &'static [&'static str] = &["name"];
    const ALTERNATE_KEY: &'static [&'static str] = &["name"];

    type Fields = VolunteerFields;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn to_fields(&self) -> VolunteerFields {
        VolunteerFields {
            id: Some(self.id),
            name: Some(self.name.clone()),
        }
    }
}

impl Repository<Volunteer> {
    /// Delete the volunteers of `owner` that are not linked to any schedule.
    pub async fn delete_unassigned(&self, owner: &str) -> Result<u64, StoreError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .context(Volunteer::ENTITY, "delete_unassigned")?;
        let removed = sqlx::query(
            r#"
            DELETE FROM volunteers
            WHERE owner = ?
              AND id NOT IN (
                  SELECT volunteer_id FROM volunteers_for_schedule WHERE owner = ?
              )
            "#,
        )
        .bind(owner)
        .bind(owner)
        .execute(&mut *tx)
        .await
        .context(Volunteer::ENTITY, "delete_unassigned")?
        .rows_affected();
        tx.commit().await.context(Volunteer::ENTITY, "delete_unassigned")?;

        tracing::debug!(owner, removed, "unassigned volunteers deleted");
        Ok(removed)
    }
}
