//! Error type shared by every store operation.
//!
//! Precondition failures are detected before any write is issued and carry
//! the entity name plus the offending input (rendered with `{:?}`), so a
//! failure can be diagnosed from the message alone.

/// Errors from the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filter record had no field set, which would match every row.
    #[error("{entity} filter has no field set: {record}")]
    InvalidFilter {
        entity: &'static str,
        record: String,
    },

    /// A mandatory field was absent or held a value outside its domain.
    #[error("{entity} field `{field}` is missing or invalid: {record}")]
    MissingRequiredField {
        entity: &'static str,
        field: &'static str,
        record: String,
    },

    #[error("{entity} already exists: {record}")]
    DuplicateExists {
        entity: &'static str,
        record: String,
    },

    /// Two records of the same call share a natural key.
    #[error("{entity} records collide within one batch: {record}")]
    DuplicateInBatch {
        entity: &'static str,
        record: String,
    },

    /// An update would give a row the natural key of another stored row.
    #[error("{entity} update would duplicate an existing row: {record}")]
    WouldDuplicate {
        entity: &'static str,
        record: String,
    },

    #[error("{entity} record has no id: {record}")]
    MissingKey {
        entity: &'static str,
        record: String,
    },

    /// A delete record named neither an id nor a complete alternate key.
    #[error("{entity} record has neither an id nor a complete alternate key: {record}")]
    MissingIdentifier {
        entity: &'static str,
        record: String,
    },

    /// An update carried its id and nothing to change.
    #[error("{entity} update has no field to change: {record}")]
    InsufficientFields {
        entity: &'static str,
        record: String,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("expected exactly one {entity} matching {filter}, found {found}")]
    NotExactlyOne {
        entity: &'static str,
        filter: String,
        found: usize,
    },

    /// A foreign key pointed at a row that does not exist.
    #[error("{entity} references a row that does not exist: {record}")]
    UnknownReference {
        entity: &'static str,
        record: String,
    },

    #[error("storage error during {operation} on {entity}: {source}")]
    Storage {
        entity: &'static str,
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Wrap a driver error with the entity and operation it came from.
    pub(crate) fn storage(entity: &'static str, operation: &'static str, source: sqlx::Error) -> Self {
        StoreError::Storage {
            entity,
            operation,
            source,
        }
    }
}

/// Attach operation context to driver results.
pub(crate) trait StorageContext<T> {
    fn context(self, entity: &'static str, operation: &'static str) -> Result<T, StoreError>;
}

impl<T> StorageContext<T> for Result<T, sqlx::Error> {
    fn context(self, entity: &'static str, operation: &'static str) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::storage(entity, operation, e))
    }
}

/// Translate constraint violations raised by a write into the matching
/// precondition error. Anything else is wrapped as a storage error.
pub(crate) fn classify_write_error(
    err: sqlx::Error,
    entity: &'static str,
    operation: &'static str,
    record: String,
    on_unique: fn(&'static str, String) -> StoreError,
) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return on_unique(entity, record);
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::UnknownReference { entity, record };
        }
    }
    StoreError::storage(entity, operation, err)
}
