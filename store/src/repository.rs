//! Generic owner-scoped repository.
//!
//! [`Repository`] implements create/request/update/delete once for every
//! [`Record`]. Each mutating call runs its checks in a fixed order (field
//! presence, then duplicates, then the write) and fails fast at the first
//! violated precondition. All reads and writes of one call share a single
//! transaction; dropping it on an error path rolls everything back.
//!
//! The pre-checks read before they write, so concurrent writers could race
//! them. The unique indexes in the schema close that gap: a constraint
//! violation raised by the write is reported as the same error kind the
//! pre-check would have produced.

use std::collections::HashSet;
use std::marker::PhantomData;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::error::{classify_write_error, StorageContext, StoreError};
use crate::filter::{build_filter, filter_terms, push_value, Predicate, Term};
use crate::record::{column, key_terms, merge_terms, Fields, Record, Rules, Table};

/// Create/request/update/delete for one entity type, scoped by owner.
pub struct Repository<R: Record> {
    pool: SqlitePool,
    rules: Rules,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            rules: self.rules,
            _record: PhantomData,
        }
    }
}

impl<R: Record> Repository<R> {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            rules: Rules::default(),
            _record: PhantomData,
        }
    }

    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> Rules {
        self.rules
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert `records` for `owner` and return the stored rows.
    ///
    /// Ids in `records` are ignored. The batch is rejected as a whole if any
    /// record lacks a required field, if two records share a natural key, or
    /// if any record matches a row already stored for `owner`.
    pub async fn create(&self, owner: &str, records: &[R::Fields]) -> Result<Vec<R>, StoreError> {
        tracing::debug!(entity = R::ENTITY, owner, records = records.len(), "create");
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.context(R::ENTITY, "create")?;
        let created = self.create_in(&mut *tx, owner, records).await?;
        tx.commit().await.context(R::ENTITY, "create")?;
        tracing::debug!(entity = R::ENTITY, owner, created = created.len(), "rows created");
        Ok(created)
    }

    /// [`Repository::create`] on a connection the caller owns, so several
    /// creates can share one transaction. Nothing is committed here.
    pub(crate) async fn create_in(
        &self,
        conn: &mut SqliteConnection,
        owner: &str,
        records: &[R::Fields],
    ) -> Result<Vec<R>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if owner.is_empty() {
            return Err(rejected(StoreError::MissingRequiredField {
                entity: R::ENTITY,
                field: "owner",
                record: format!("{:?}", records),
            }));
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            rows.push(self.required_terms(record)?);
        }

        let mut keys = HashSet::with_capacity(rows.len());
        for (record, terms) in records.iter().zip(&rows) {
            if !keys.insert(key_terms(terms, R::NATURAL_KEY)) {
                return Err(rejected(StoreError::DuplicateInBatch {
                    entity: R::ENTITY,
                    record: format!("{:?}", record),
                }));
            }
        }

        ensure_owner(&mut *conn, owner).await.context(R::ENTITY, "create")?;

        let existing = Predicate::scoped(owner, keys.into_iter().collect());
        let found = select::<R>(&mut *conn, &existing)
            .await
            .context(R::ENTITY, "create")?;
        if let Some(row) = found.first() {
            return Err(rejected(StoreError::DuplicateExists {
                entity: R::ENTITY,
                record: format!("{:?}", row),
            }));
        }

        for (record, terms) in records.iter().zip(&rows) {
            check_owned_references::<R>(&mut *conn, owner, record, terms, "create").await?;
        }

        let mut created = Vec::with_capacity(rows.len());
        for (record, terms) in records.iter().zip(&rows) {
            let row = insert::<R>(&mut *conn, owner, terms).await.map_err(|e| {
                classify_write_error(e, R::ENTITY, "create", format!("{:?}", record), |entity, record| {
                    StoreError::DuplicateExists { entity, record }
                })
            })?;
            created.push(row);
        }
        Ok(created)
    }

    /// Rows of `owner` matching any of `filters`, ordered by id. An empty
    /// slice returns every row of `owner`.
    pub async fn request(&self, owner: &str, filters: &[R::Fields]) -> Result<Vec<R>, StoreError> {
        let predicate = build_filter(R::ENTITY, owner, filters).map_err(rejected)?;
        let mut conn = self.pool.acquire().await.context(R::ENTITY, "request")?;
        let rows = select::<R>(&mut *conn, &predicate)
            .await
            .context(R::ENTITY, "request")?;
        tracing::debug!(entity = R::ENTITY, owner, matched = rows.len(), "request");
        Ok(rows)
    }

    /// The single row of `owner` matching `filter`.
    pub async fn request_single(&self, owner: &str, filter: &R::Fields) -> Result<R, StoreError> {
        let mut rows = self.request(owner, std::slice::from_ref(filter)).await?;
        if rows.len() != 1 {
            return Err(rejected(StoreError::NotExactlyOne {
                entity: R::ENTITY,
                filter: format!("{:?}", filter),
                found: rows.len(),
            }));
        }
        Ok(rows.remove(0))
    }

    /// Apply each patch in `records` to the row with the same id and return
    /// the updated rows.
    ///
    /// Only the fields present in a patch change. A patch must carry an id
    /// and at least one field; the merged row must not collide with another
    /// stored row or with another merged row of the same batch.
    pub async fn update(&self, owner: &str, records: &[R::Fields]) -> Result<Vec<R>, StoreError> {
        tracing::debug!(entity = R::ENTITY, owner, records = records.len(), "update");
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut patches = Vec::with_capacity(records.len());
        let mut seen_ids = HashSet::with_capacity(records.len());
        for record in records {
            let id = record.id().ok_or_else(|| {
                rejected(StoreError::MissingKey {
                    entity: R::ENTITY,
                    record: format!("{:?}", record),
                })
            })?;
            if !seen_ids.insert(id) {
                return Err(rejected(StoreError::DuplicateInBatch {
                    entity: R::ENTITY,
                    record: format!("{:?}", record),
                }));
            }
            // Empty text means "unchanged", as it means "unset" in a filter
            let terms: Vec<Term> = record
                .terms()
                .into_iter()
                .filter(|t| !t.value.is_empty_text())
                .collect();
            if terms.is_empty() {
                return Err(rejected(StoreError::InsufficientFields {
                    entity: R::ENTITY,
                    record: format!("{:?}", record),
                }));
            }
            self.check_values(record, &terms)?;
            patches.push((id, terms));
        }

        let mut tx = self.pool.begin().await.context(R::ENTITY, "update")?;

        let mut merged_keys = HashSet::with_capacity(patches.len());
        let mut planned = Vec::with_capacity(patches.len());
        for (record, (id, patch)) in records.iter().zip(&patches) {
            let rows = select::<R>(&mut *tx, &Predicate::by_id(owner, *id))
                .await
                .context(R::ENTITY, "update")?;
            let [current] = rows.as_slice() else {
                return Err(rejected(StoreError::NotFound {
                    entity: R::ENTITY,
                    key: format!("id {} ({} matches)", id, rows.len()),
                }));
            };

            let merged = merge_terms(current.to_fields().terms(), patch);
            let key = key_terms(&merged, R::NATURAL_KEY);
            if !merged_keys.insert(key.clone()) {
                return Err(rejected(StoreError::DuplicateInBatch {
                    entity: R::ENTITY,
                    record: format!("{:?}", record),
                }));
            }
            planned.push((*id, key));
        }

        for (record, (id, key)) in records.iter().zip(planned) {
            let clash = Predicate::scoped(owner, vec![key]).excluding(id);
            let others = select::<R>(&mut *tx, &clash)
                .await
                .context(R::ENTITY, "update")?;
            if let Some(other) = others.first() {
                return Err(rejected(StoreError::WouldDuplicate {
                    entity: R::ENTITY,
                    record: format!("{:?} collides with {:?}", record, other),
                }));
            }
        }

        for (record, (_, patch)) in records.iter().zip(&patches) {
            check_owned_references::<R>(&mut *tx, owner, record, patch, "update").await?;
        }

        let mut updated = Vec::with_capacity(patches.len());
        for (record, (id, patch)) in records.iter().zip(&patches) {
            let row = update_row::<R>(&mut *tx, owner, *id, patch).await.map_err(|e| {
                classify_write_error(e, R::ENTITY, "update", format!("{:?}", record), |entity, record| {
                    StoreError::WouldDuplicate { entity, record }
                })
            })?;
            updated.push(row);
        }

        tx.commit().await.context(R::ENTITY, "update")?;
        tracing::debug!(entity = R::ENTITY, owner, updated = updated.len(), "rows updated");
        Ok(updated)
    }

    /// Delete the rows of `owner` named by `records` and return how many
    /// were removed.
    ///
    /// A record names rows by id, or by a complete alternate key when it has
    /// no id. Matching nothing is not an error.
    pub async fn delete(&self, owner: &str, records: &[R::Fields]) -> Result<u64, StoreError> {
        tracing::debug!(entity = R::ENTITY, owner, records = records.len(), "delete");
        if records.is_empty() {
            return Ok(0);
        }

        let mut targets = Vec::with_capacity(records.len());
        for record in records {
            if let Some(id) = record.id() {
                targets.push(vec![Term::id(id)]);
                continue;
            }
            let key = key_terms(&filter_terms(record), R::ALTERNATE_KEY);
            if key.len() != R::ALTERNATE_KEY.len() {
                return Err(rejected(StoreError::MissingIdentifier {
                    entity: R::ENTITY,
                    record: format!("{:?}", record),
                }));
            }
            targets.push(key);
        }

        let mut tx = self.pool.begin().await.context(R::ENTITY, "delete")?;
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        builder.push(R::TABLE);
        Predicate::scoped(owner, targets).push_where(&mut builder);
        let removed = builder
            .build()
            .execute(&mut *tx)
            .await
            .context(R::ENTITY, "delete")?
            .rows_affected();
        tx.commit().await.context(R::ENTITY, "delete")?;

        tracing::debug!(entity = R::ENTITY, owner, removed, "rows deleted");
        Ok(removed)
    }

    /// Every data column of `record`, each present and within its domain.
    fn required_terms(&self, record: &R::Fields) -> Result<Vec<Term>, StoreError> {
        let terms = record.terms();
        R::COLUMNS
            .iter()
            .map(|col| {
                terms
                    .iter()
                    .find(|t| t.column == col.name && col.rule.accepts(&t.value, self.rules))
                    .cloned()
                    .ok_or_else(|| {
                        rejected(StoreError::MissingRequiredField {
                            entity: R::ENTITY,
                            field: col.name,
                            record: format!("{:?}", record),
                        })
                    })
            })
            .collect()
    }

    /// Reject patch values outside their column's domain.
    fn check_values(&self, record: &R::Fields, terms: &[Term]) -> Result<(), StoreError> {
        for term in terms {
            let valid = column::<R>(term.column)
                .map(|col| col.rule.accepts(&term.value, self.rules))
                .unwrap_or(false);
            if !valid {
                return Err(rejected(StoreError::MissingRequiredField {
                    entity: R::ENTITY,
                    field: term.column,
                    record: format!("{:?}", record),
                }));
            }
        }
        Ok(())
    }
}

pub(crate) fn rejected(err: StoreError) -> StoreError {
    tracing::warn!(error = %err, "request rejected");
    err
}

/// Fail with `UnknownReference` unless every owner-scoped row named in
/// `terms` exists for `owner`.
async fn check_owned_references<R: Record>(
    conn: &mut SqliteConnection,
    owner: &str,
    record: &R::Fields,
    terms: &[Term],
    operation: &'static str,
) -> Result<(), StoreError> {
    for (column, table) in R::OWNED_REFERENCES {
        let Some(term) = terms.iter().find(|t| t.column == *column) else {
            continue;
        };
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
        builder
            .push(*table)
            .push(" WHERE owner = ")
            .push_bind(owner.to_string())
            .push(" AND id = ");
        push_value(&mut builder, &term.value);
        let (found,): (i64,) = builder
            .build_query_as()
            .fetch_one(&mut *conn)
            .await
            .context(R::ENTITY, operation)?;
        if found == 0 {
            return Err(rejected(StoreError::UnknownReference {
                entity: R::ENTITY,
                record: format!("{:?} ({} not found for {})", record, column, owner),
            }));
        }
    }
    Ok(())
}

/// Register `owner` in `users` if it is not there yet.
pub(crate) async fn ensure_owner(conn: &mut SqliteConnection, owner: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO users (user_name) VALUES (?)")
        .bind(owner)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Rows of `T` matching `predicate`, ordered by id.
pub(crate) async fn select<T: Table>(
    conn: &mut SqliteConnection,
    predicate: &Predicate,
) -> Result<Vec<T>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
    builder.push(T::SELECT).push(" FROM ").push(T::TABLE);
    predicate.push_where(&mut builder);
    builder.push(" ORDER BY id");
    builder.build_query_as::<T>().fetch_all(&mut *conn).await
}

async fn insert<R: Record>(
    conn: &mut SqliteConnection,
    owner: &str,
    terms: &[Term],
) -> Result<R, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO ");
    builder.push(R::TABLE).push(" (owner");
    for term in terms {
        builder.push(", ").push(term.column);
    }
    builder.push(") VALUES (").push_bind(owner.to_string());
    for term in terms {
        builder.push(", ");
        push_value(&mut builder, &term.value);
    }
    builder.push(") RETURNING ").push(R::SELECT);
    builder.build_query_as::<R>().fetch_one(&mut *conn).await
}

async fn update_row<R: Record>(
    conn: &mut SqliteConnection,
    owner: &str,
    id: i64,
    patch: &[Term],
) -> Result<R, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ");
    builder.push(R::TABLE).push(" SET ");
    for (i, term) in patch.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(term.column).push(" = ");
        push_value(&mut builder, &term.value);
    }
    builder
        .push(" WHERE owner = ")
        .push_bind(owner.to_string())
        .push(" AND id = ")
        .push_bind(id)
        .push(" RETURNING ")
        .push(R::SELECT);
    builder.build_query_as::<R>().fetch_one(&mut *conn).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Volunteer, VolunteerFields};
    use crate::sqlite::Database;

    async fn test_repo() -> (Database, Repository<Volunteer>) {
        let db = Database::new_in_memory().await.unwrap();
        let repo = Repository::<Volunteer>::new(db.pool().clone());
        (db, repo)
    }

    async fn count_rows(db: &Database) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM volunteers")
            .fetch_one(db.pool())
            .await
            .unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_create_empty_batch_is_noop() {
        let (db, repo) = test_repo().await;
        let created = repo.create("Seth", &[]).await.unwrap();
        assert!(created.is_empty());
        assert_eq!(count_rows(&db).await, 0);
    }

    #[tokio::test]
    async fn test_create_registers_owner() {
        let (db, repo) = test_repo().await;
        repo.create("Ann", &[VolunteerFields::named("Tim")]).await.unwrap();
        let row: (String,) = sqlx::query_as("SELECT user_name FROM users WHERE user_name = 'Ann'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, "Ann");
    }

    #[tokio::test]
    async fn test_create_rejects_empty_owner() {
        let (db, repo) = test_repo().await;
        let result = repo.create("", &[VolunteerFields::named("Tim")]).await;
        assert!(
            matches!(result, Err(StoreError::MissingRequiredField { field: "owner", .. })),
            "expected MissingRequiredField, got {:?}",
            result
        );
        assert_eq!(count_rows(&db).await, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_storage_unchanged() {
        let (db, repo) = test_repo().await;
        repo.create("Seth", &[VolunteerFields::named("Bill")]).await.unwrap();

        let batch = [VolunteerFields::named("Jack"), VolunteerFields::named("Bill")];
        let result = repo.create("Seth", &batch).await;
        assert!(matches!(result, Err(StoreError::DuplicateExists { .. })));
        assert_eq!(count_rows(&db).await, 1);
    }

    #[tokio::test]
    async fn test_request_single_counts_matches() {
        let (_db, repo) = test_repo().await;
        repo.create("Seth", &[VolunteerFields::named("Tim"), VolunteerFields::named("Bob")])
            .await
            .unwrap();

        let tim = repo.request_single("Seth", &VolunteerFields::named("Tim")).await.unwrap();
        assert_eq!(tim.name, "Tim");

        let result = repo.request_single("Seth", &VolunteerFields::named("Nobody")).await;
        assert!(
            matches!(result, Err(StoreError::NotExactlyOne { found: 0, .. })),
            "expected NotExactlyOne, got {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_update_unknown_id_not_found() {
        let (_db, repo) = test_repo().await;
        let patch = VolunteerFields {
            id: Some(42),
            name: Some("Tim".into()),
        };
        let result = repo.update("Seth", &[patch]).await;
        assert!(
            matches!(result, Err(StoreError::NotFound { entity: "volunteer", .. })),
            "expected NotFound, got {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_update_other_owner_not_found() {
        let (_db, repo) = test_repo().await;
        let created = repo.create("Seth", &[VolunteerFields::named("Tim")]).await.unwrap();
        let patch = VolunteerFields {
            id: Some(created[0].id),
            name: Some("Timothy".into()),
        };
        let result = repo.update("Ann", &[patch]).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_empty_text_changes_nothing() {
        let (_db, repo) = test_repo().await;
        let created = repo.create("Seth", &[VolunteerFields::named("Tim")]).await.unwrap();
        let patch = VolunteerFields {
            id: Some(created[0].id),
            name: Some(String::new()),
        };
        let result = repo.update("Seth", &[patch]).await;
        assert!(
            matches!(result, Err(StoreError::InsufficientFields { .. })),
            "expected InsufficientFields, got {:?}",
            result
        );
        assert_eq!(repo.request("Seth", &[]).await.unwrap()[0].name, "Tim");
    }

    #[tokio::test]
    async fn test_delete_without_identifier() {
        let (_db, repo) = test_repo().await;
        let result = repo.delete("Seth", &[VolunteerFields::default()]).await;
        assert!(
            matches!(result, Err(StoreError::MissingIdentifier { .. })),
            "expected MissingIdentifier, got {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_delete_prefers_id_over_alternate_key() {
        let (_db, repo) = test_repo().await;
        let created = repo
            .create("Seth", &[VolunteerFields::named("Tim"), VolunteerFields::named("Bob")])
            .await
            .unwrap();

        let record = VolunteerFields {
            id: Some(created[0].id),
            name: Some("Bob".into()),
        };
        let removed = repo.delete("Seth", &[record]).await.unwrap();
        assert_eq!(removed, 1);

        let left = repo.request("Seth", &[]).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].name, "Bob");
    }

    #[tokio::test]
    async fn test_large_batches() {
        let (db, repo) = test_repo().await;
        let records: Vec<_> = (0..1500)
            .map(|i| VolunteerFields::named(format!("volunteer-{}", i)))
            .collect();

        let created = repo.create("Seth", &records).await.unwrap();
        assert_eq!(created.len(), 1500);

        let result = repo.create("Seth", &records).await;
        assert!(matches!(result, Err(StoreError::DuplicateExists { .. })));

        let found = repo.request("Seth", &records).await.unwrap();
        assert_eq!(found.len(), 1500);

        let removed = repo.delete("Seth", &records).await.unwrap();
        assert_eq!(removed, 1500);
        assert_eq!(count_rows(&db).await, 0);
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let (_db, repo) = test_repo().await;
        repo.create("Seth", &[VolunteerFields::named("Tim")]).await.unwrap();
        repo.create("Ann", &[VolunteerFields::named("Tim")]).await.unwrap();

        assert_eq!(repo.request("Seth", &[]).await.unwrap().len(), 1);
        assert_eq!(repo.delete("Ann", &[VolunteerFields::named("Tim")]).await.unwrap(), 1);
        assert_eq!(repo.request("Seth", &[]).await.unwrap().len(), 1);
    }
}
