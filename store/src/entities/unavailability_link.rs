use serde::Serialize;

use crate::filter::Term;
use crate::record::{push_integer, Column, Fields, Record, Rule, Table};

/// A volunteer, within one schedule, cannot serve on a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UnavailabilityLink {
    pub id: i64,
    pub owner: String,
    pub volunteer_link_id: i64,
    pub date_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnavailabilityLinkFields {
    pub id: Option<i64>,
    pub volunteer_link_id: Option<i64>,
    pub date_id: Option<i64>,
}

impl UnavailabilityLinkFields {
    pub fn new(volunteer_link_id: i64, date_id: i64) -> Self {
        Self {
            id: None,
            volunteer_link_id: Some(volunteer_link_id),
            date_id: Some(date_id),
        }
    }

    pub fn for_volunteer_link(volunteer_link_id: i64) -> Self {
        Self {
            volunteer_link_id: Some(volunteer_link_id),
            ..Default::default()
        }
    }
}

impl Fields for UnavailabilityLinkFields {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        push_integer(&mut terms, "volunteer_link_id", self.volunteer_link_id);
        push_integer(&mut terms, "date_id", self.date_id);
        terms
    }
}

impl Table for UnavailabilityLink {
    const ENTITY: &'static str = "unavailability link";
    const TABLE: &'static str = "unavailabilities_for_schedule";
    const SELECT: &'static str = "id, owner, volunteer_link_id, date_id";
}

impl Record for UnavailabilityLink {
    const COLUMNS: &'static [Column] = &[
        Column::new("volunteer_link_id", Rule::Positive),
        Column::new("date_id", Rule::Positive),
    ];
    const NATURAL_KEY: &'static [&'static str] = &["volunteer_link_id", "date_id"];
    const ALTERNATE_KEY: &'static [&'static str] = &["volunteer_link_id", "date_id"];
    const OWNED_REFERENCES: &'static [(&'static str, &'static str)] =
        &[("volunteer_link_id", "volunteers_for_schedule")];

    type Fields = UnavailabilityLinkFields;

    fn id(&self) -> i64 {
        self.id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn to_fields(&self) -> UnavailabilityLinkFields {
        UnavailabilityLinkFields {
            id: Some(self.id),
            volunteer_link_id: Some(self.volunteer_link_id),
            date_id: Some(self.date_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        Schedule, ScheduleFields, Volunteer, VolunteerFields, VolunteerLink, VolunteerLinkFields,
    };
    use crate::error::StoreError;
    use crate::repository::Repository;
    use crate::sqlite::Database;

    async fn test_repo() -> (Database, Repository<UnavailabilityLink>) {
        let db = Database::new_in_memory().await.unwrap();
        Repository::<Schedule>::new(db.pool().clone())
            .create("Seth", &[ScheduleFields::new("test1", 3, 3, 10, 20)])
            .await
            .unwrap();
        Repository::<Volunteer>::new(db.pool().clone())
            .create("Seth", &[VolunteerFields::named("Tim")])
            .await
            .unwrap();
        Repository::<VolunteerLink>::new(db.pool().clone())
            .create("Seth", &[VolunteerLinkFields::new(1, 1)])
            .await
            .unwrap();
        let repo = Repository::new(db.pool().clone());
        (db, repo)
    }

    #[tokio::test]
    async fn test_create_and_request_by_link() {
        let (_db, repo) = test_repo().await;
        let batch = [
            UnavailabilityLinkFields::new(1, 618),
            UnavailabilityLinkFields::new(1, 619),
        ];
        let created = repo.create("Seth", &batch).await.unwrap();
        assert_eq!(created.len(), 2);

        let found = repo
            .request("Seth", &[UnavailabilityLinkFields::for_volunteer_link(1)])
            .await
            .unwrap();
        let dates: Vec<i64> = found.iter().map(|u| u.date_id).collect();
        assert_eq!(dates, vec![618, 619]);
    }

    #[tokio::test]
    async fn test_create_duplicate_in_batch() {
        let (_db, repo) = test_repo().await;
        let batch = [
            UnavailabilityLinkFields::new(1, 618),
            UnavailabilityLinkFields::new(1, 618),
        ];
        let result = repo.create("Seth", &batch).await;
        assert!(matches!(result, Err(StoreError::DuplicateInBatch { .. })));
    }

    #[tokio::test]
    async fn test_create_requires_date() {
        let (_db, repo) = test_repo().await;
        let result = repo.create("Seth", &[UnavailabilityLinkFields::for_volunteer_link(1)]).await;
        assert!(matches!(result, Err(StoreError::MissingRequiredField { field: "date_id", .. })));
    }

    #[tokio::test]
    async fn test_cascade_from_volunteer_link() {
        let (db, repo) = test_repo().await;
        repo.create("Seth", &[UnavailabilityLinkFields::new(1, 618)]).await.unwrap();

        Repository::<VolunteerLink>::new(db.pool().clone())
            .delete("Seth", &[VolunteerLinkFields::with_id(1)])
            .await
            .unwrap();
        assert!(repo.request("Seth", &[]).await.unwrap().is_empty());
    }
}
