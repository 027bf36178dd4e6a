//! Orphan reconciliation for link rows.
//!
//! The caller hands over an authoritative snapshot: for each parent, the
//! set of child discriminators that should stay linked. Every link row of
//! that parent whose discriminator is missing from the set is deleted.
//!
//! Three sweeps share one driver:
//!
//! | Sweep | Parent | Discriminator |
//! |-------|--------|---------------|
//! | [`Reconciler::reconcile_weekday_links`] | schedule | weekday name |
//! | [`Reconciler::reconcile_volunteer_links`] | schedule | volunteer name |
//! | [`Reconciler::reconcile_unavailability_links`] | volunteer link | date id |
//!
//! A whole call runs in one transaction. Either every orphan of every
//! listed parent is removed, or nothing is.

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::entities::{
    Schedule, ScheduleFields, UnavailabilityLink, VolunteerLink, VolunteerLinkFields, WeekdayLink,
};
use crate::error::{StorageContext, StoreError};
use crate::record::{Fields, Table};
use crate::repository::rejected;

/// How one kind of link row is matched against its snapshot.
trait Sweep {
    /// Entity name of the link rows being swept.
    const ENTITY: &'static str;
    /// Entity name of the parent, for errors.
    const PARENT: &'static str;
    /// Entity name of the discriminator, for errors.
    const DISCRIMINATOR: &'static str;
    const TABLE: &'static str;

    type Parent: Fields;
    type Discriminator: Debug + Clone + Eq + Hash + Send + Sync;

    /// Discriminators among `wanted` that exist for `owner`.
    fn resolve(
        conn: &mut SqliteConnection,
        owner: &str,
        wanted: &[Self::Discriminator],
    ) -> impl Future<Output = Result<Vec<Self::Discriminator>, sqlx::Error>> + Send;

    /// `(link id, discriminator)` for every link row of `parent_id`.
    fn linked(
        conn: &mut SqliteConnection,
        owner: &str,
        parent_id: i64,
    ) -> impl Future<Output = Result<Vec<(i64, Self::Discriminator)>, sqlx::Error>> + Send;
}

struct WeekdaySweep;

impl Sweep for WeekdaySweep {
    const ENTITY: &'static str = WeekdayLink::ENTITY;
    const PARENT: &'static str = Schedule::ENTITY;
    const DISCRIMINATOR: &'static str = "weekday";
    const TABLE: &'static str = WeekdayLink::TABLE;

    type Parent = ScheduleFields;
    type Discriminator = String;

    async fn resolve(
        conn: &mut SqliteConnection,
        _owner: &str,
        wanted: &[String],
    ) -> Result<Vec<String>, sqlx::Error> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT weekday_name FROM weekdays WHERE weekday_name IN (");
        push_list(&mut builder, wanted.iter().cloned());
        let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn linked(
        conn: &mut SqliteConnection,
        owner: &str,
        parent_id: i64,
    ) -> Result<Vec<(i64, String)>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, weekday
            FROM weekdays_for_schedule
            WHERE owner = ? AND schedule_id = ?
            ORDER BY id
            "#,
        )
        .bind(owner)
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await
    }
}

struct VolunteerSweep;

impl Sweep for VolunteerSweep {
    const ENTITY: &'static str = VolunteerLink::ENTITY;
    const PARENT: &'static str = Schedule::ENTITY;
    const DISCRIMINATOR: &'static str = "volunteer";
    const TABLE: &'static str = VolunteerLink::TABLE;

    type Parent = ScheduleFields;
    type Discriminator = String;

    async fn resolve(
        conn: &mut SqliteConnection,
        owner: &str,
        wanted: &[String],
    ) -> Result<Vec<String>, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT name FROM volunteers WHERE owner = ");
        builder.push_bind(owner.to_string()).push(" AND name IN (");
        push_list(&mut builder, wanted.iter().cloned());
        let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    // Names are joined in, rather than looked up per link row
    async fn linked(
        conn: &mut SqliteConnection,
        owner: &str,
        parent_id: i64,
    ) -> Result<Vec<(i64, String)>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT l.id, v.name
            FROM volunteers_for_schedule l
            JOIN volunteers v ON v.id = l.volunteer_id
            WHERE l.owner = ? AND l.schedule_id = ?
            ORDER BY l.id
            "#,
        )
        .bind(owner)
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await
    }
}

struct UnavailabilitySweep;

impl Sweep for UnavailabilitySweep {
    const ENTITY: &'static str = UnavailabilityLink::ENTITY;
    const PARENT: &'static str = VolunteerLink::ENTITY;
    const DISCRIMINATOR: &'static str = "date";
    const TABLE: &'static str = UnavailabilityLink::TABLE;

    type Parent = VolunteerLinkFields;
    type Discriminator = i64;

    async fn resolve(
        conn: &mut SqliteConnection,
        _owner: &str,
        wanted: &[i64],
    ) -> Result<Vec<i64>, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM dates WHERE id IN (");
        push_list(&mut builder, wanted.iter().copied());
        let rows: Vec<(i64,)> = builder.build_query_as().fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn linked(
        conn: &mut SqliteConnection,
        owner: &str,
        parent_id: i64,
    ) -> Result<Vec<(i64, i64)>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, date_id
            FROM unavailabilities_for_schedule
            WHERE owner = ? AND volunteer_link_id = ?
            ORDER BY id
            "#,
        )
        .bind(owner)
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await
    }
}

/// Push `values` as bound parameters followed by the closing `)`.
fn push_list<'args, T>(builder: &mut QueryBuilder<'args, Sqlite>, values: impl IntoIterator<Item = T>)
where
    T: 'args + sqlx::Encode<'args, Sqlite> + sqlx::Type<Sqlite> + Send,
{
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value);
    }
    separated.push_unseparated(")");
}

/// Deletes link rows that are no longer part of a caller's snapshot.
#[derive(Clone)]
pub struct Reconciler {
    pool: SqlitePool,
}

impl Reconciler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Keep only the listed weekdays on each schedule. Returns the number of
    /// weekday links deleted.
    #[tracing::instrument(level = "debug", skip(self, snapshot))]
    pub async fn reconcile_weekday_links(
        &self,
        owner: &str,
        snapshot: &[(ScheduleFields, Vec<String>)],
    ) -> Result<u64, StoreError> {
        self.sweep::<WeekdaySweep>(owner, snapshot).await
    }

    /// Keep only the named volunteers on each schedule.
    #[tracing::instrument(level = "debug", skip(self, snapshot))]
    pub async fn reconcile_volunteer_links(
        &self,
        owner: &str,
        snapshot: &[(ScheduleFields, Vec<String>)],
    ) -> Result<u64, StoreError> {
        self.sweep::<VolunteerSweep>(owner, snapshot).await
    }

    /// Keep only the listed unavailable dates on each volunteer link.
    #[tracing::instrument(level = "debug", skip(self, snapshot))]
    pub async fn reconcile_unavailability_links(
        &self,
        owner: &str,
        snapshot: &[(VolunteerLinkFields, Vec<i64>)],
    ) -> Result<u64, StoreError> {
        self.sweep::<UnavailabilitySweep>(owner, snapshot).await
    }

    async fn sweep<S: Sweep>(
        &self,
        owner: &str,
        snapshot: &[(S::Parent, Vec<S::Discriminator>)],
    ) -> Result<u64, StoreError> {
        tracing::debug!(entity = S::ENTITY, owner, parents = snapshot.len(), "reconcile");

        let mut parents = Vec::with_capacity(snapshot.len());
        for (parent, allowed) in snapshot {
            let id = parent.id().ok_or_else(|| {
                rejected(StoreError::MissingKey {
                    entity: S::PARENT,
                    record: format!("{:?}", parent),
                })
            })?;
            parents.push((id, allowed));
        }

        let mut tx = self.pool.begin().await.context(S::ENTITY, "reconcile")?;

        let mut orphans = Vec::new();
        for (parent_id, allowed) in parents {
            let allowed: HashSet<&S::Discriminator> = allowed.iter().collect();

            if !allowed.is_empty() {
                let wanted: Vec<S::Discriminator> = allowed.iter().map(|d| (*d).clone()).collect();
                let found: HashSet<S::Discriminator> = S::resolve(&mut *tx, owner, &wanted)
                    .await
                    .context(S::ENTITY, "reconcile")?
                    .into_iter()
                    .collect();
                if let Some(missing) = wanted.iter().find(|d| !found.contains(*d)) {
                    return Err(rejected(StoreError::NotFound {
                        entity: S::DISCRIMINATOR,
                        key: format!("{:?}", missing),
                    }));
                }
            }

            let linked = S::linked(&mut *tx, owner, parent_id)
                .await
                .context(S::ENTITY, "reconcile")?;
            orphans.extend(
                linked
                    .into_iter()
                    .filter(|(_, discriminator)| !allowed.contains(discriminator))
                    .map(|(link_id, _)| link_id),
            );
        }

        if orphans.is_empty() {
            tx.commit().await.context(S::ENTITY, "reconcile")?;
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        builder
            .push(S::TABLE)
            .push(" WHERE owner = ")
            .push_bind(owner.to_string())
            .push(" AND id IN (");
        push_list(&mut builder, orphans.iter().copied());
        let removed = builder
            .build()
            .execute(&mut *tx)
            .await
            .context(S::ENTITY, "reconcile")?
            .rows_affected();

        tx.commit().await.context(S::ENTITY, "reconcile")?;
        tracing::debug!(entity = S::ENTITY, owner, removed, "orphans deleted");
        Ok(removed)
    }
}
