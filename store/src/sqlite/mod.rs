//! SQLite storage.
//!
//! ## Database setup
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with:
//! - **WAL mode** for file databases, so readers never block the writer.
//! - **Foreign keys enabled** at the connection level. Link rows cascade
//!   away with their schedule, volunteer or volunteer link.
//! - **Embedded migrations** via `sqlx::migrate!`, run on every open. The
//!   schema and its weekday and month rows are idempotent.
//!
//! After migrating, the `dates` table is seeded once with a contiguous run
//! of days (see [`StoreConfig`](crate::config::StoreConfig)).

mod database;
mod seed;
#[cfg(test)]
mod integration_tests;

pub use database::Database;
