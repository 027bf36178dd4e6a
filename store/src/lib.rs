//! Owner-scoped persistence for volunteer rotas.
//!
//! The store keeps volunteers, schedules and the links between them in a
//! single SQLite database, next to a read-only calendar of weekdays,
//! months and dates. Every owner-scoped operation takes the owner name and
//! never sees another owner's rows.
//!
//! ```no_run
//! # async fn demo() -> Result<(), rota_store::StoreError> {
//! use rota_store::config::{get_database_path, StoreConfig};
//! use rota_store::entities::VolunteerFields;
//! use rota_store::{Database, Store};
//!
//! let db = Database::open(&get_database_path(), &StoreConfig::from_env()).await?;
//! let store = Store::new(&db);
//! store.volunteers.create("Seth", &[VolunteerFields::named("Tim")]).await?;
//! # Ok(())
//! # }
//! ```

pub mod calendar;
pub mod config;
pub mod entities;
mod error;
pub mod filter;
pub mod reconcile;
pub mod record;
pub mod repository;
pub mod sqlite;

pub use error::StoreError;
pub use sqlite::Database;

use calendar::Calendar;
use entities::{
    Schedule, ScheduleFields, UnavailabilityLink, Volunteer, VolunteerLink, VolunteerLinkFields,
    WeekdayLink, WeekdayLinkFields,
};
use error::StorageContext;
use reconcile::Reconciler;
use record::Table;
use repository::Repository;

/// Every repository of one database, sharing its pool and rules.
#[derive(Clone)]
pub struct Store {
    pub volunteers: Repository<Volunteer>,
    pub schedules: Repository<Schedule>,
    pub weekday_links: Repository<WeekdayLink>,
    pub volunteer_links: Repository<VolunteerLink>,
    pub unavailability_links: Repository<UnavailabilityLink>,
    pub calendar: Calendar,
    pub reconciler: Reconciler,
}

impl Store {
    pub fn new(db: &Database) -> Self {
        let pool = db.pool();
        let rules = db.rules();
        Self {
            volunteers: Repository::new(pool.clone()).with_rules(rules),
            schedules: Repository::new(pool.clone()).with_rules(rules),
            weekday_links: Repository::new(pool.clone()).with_rules(rules),
            volunteer_links: Repository::new(pool.clone()).with_rules(rules),
            unavailability_links: Repository::new(pool.clone()).with_rules(rules),
            calendar: Calendar::new(pool.clone()),
            reconciler: Reconciler::new(pool.clone()),
        }
    }

    /// Create `schedule` together with its weekday and volunteer links.
    ///
    /// All three inserts share one transaction: a bad weekday name, a
    /// volunteer id of another owner or a repeated link leaves nothing
    /// stored.
    pub async fn create_schedule(
        &self,
        owner: &str,
        schedule: &ScheduleFields,
        weekdays: &[String],
        volunteer_ids: &[i64],
    ) -> Result<Schedule, StoreError> {
        let mut tx = self
            .schedules
            .pool()
            .begin()
            .await
            .context(Schedule::ENTITY, "create")?;

        let mut created = self
            .schedules
            .create_in(&mut *tx, owner, std::slice::from_ref(schedule))
            .await?;
        let Some(row) = created.pop() else {
            return Err(StoreError::NotFound {
                entity: Schedule::ENTITY,
                key: format!("{:?}", schedule),
            });
        };

        let days: Vec<_> = weekdays
            .iter()
            .map(|day| WeekdayLinkFields::new(day, row.id))
            .collect();
        self.weekday_links.create_in(&mut *tx, owner, &days).await?;

        let links: Vec<_> = volunteer_ids
            .iter()
            .map(|id| VolunteerLinkFields::new(row.id, *id))
            .collect();
        self.volunteer_links.create_in(&mut *tx, owner, &links).await?;

        tx.commit().await.context(Schedule::ENTITY, "create")?;
        tracing::debug!(
            owner,
            schedule_id = row.id,
            weekdays = days.len(),
            volunteers = links.len(),
            "schedule created with links"
        );
        Ok(row)
    }
}
