//! Row mapping between stored rows and in-memory records.
//!
//! Every table the store reads implements [`Table`]; owner-scoped entities
//! additionally implement [`Record`], which carries the static column
//! descriptors the generic repository and predicate builder work from.
//! Column names only ever come from these descriptors.

use std::fmt::Debug;

use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use crate::filter::{Term, Value};

/// A readable table and the column list used to decode its rows.
pub trait Table: for<'r> FromRow<'r, SqliteRow> + Debug + Send + Unpin + 'static {
    /// Entity name used in errors and logs.
    const ENTITY: &'static str;
    const TABLE: &'static str;
    /// Comma-separated column list matching the `FromRow` field names.
    const SELECT: &'static str;
}

/// Value domain a column accepts on create and update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Non-empty text.
    Text,
    /// Integer greater than zero.
    Positive,
    /// Integer greater than zero, or zero when [`Rules::allow_zero_counts`] is set.
    Count,
}

impl Rule {
    pub fn accepts(self, value: &Value, rules: Rules) -> bool {
        match (self, value) {
            (Rule::Text, Value::Text(text)) => !text.is_empty(),
            (Rule::Positive, Value::Integer(n)) => *n > 0,
            (Rule::Count, Value::Integer(n)) => *n > 0 || (*n == 0 && rules.allow_zero_counts),
            _ => false,
        }
    }
}

/// Store-wide validation policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rules {
    /// Accept zero for [`Rule::Count`] columns (schedules with no shifts off).
    pub allow_zero_counts: bool,
}

/// A stored data column (everything except `id` and `owner`).
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub rule: Rule,
}

impl Column {
    pub const fn new(name: &'static str, rule: Rule) -> Self {
        Self { name, rule }
    }
}

/// Partially populated field set: a filter on reads, a patch on updates,
/// a full row on creates.
pub trait Fields: Debug + Clone + Default + Send + Sync {
    fn id(&self) -> Option<i64>;

    /// Terms for every data field that is `Some`, in column order.
    fn terms(&self) -> Vec<Term>;
}

/// An owner-scoped entity managed by [`crate::repository::Repository`].
pub trait Record: Table + Clone + Sync {
    /// Data columns, in the order `Fields::terms` reports them.
    const COLUMNS: &'static [Column];
    /// Columns that must be unique per owner.
    const NATURAL_KEY: &'static [&'static str];
    /// Columns that identify rows for deletion when no id is given.
    const ALTERNATE_KEY: &'static [&'static str];
    /// `(column, table)` pairs naming owner-scoped rows this entity points
    /// at. A referenced row must belong to the same owner.
    const OWNED_REFERENCES: &'static [(&'static str, &'static str)] = &[];

    type Fields: Fields;

    fn id(&self) -> i64;
    fn owner(&self) -> &str;

    /// The row as a fully populated field set, id included.
    fn to_fields(&self) -> Self::Fields;
}

/// Find the descriptor for `name`.
pub(crate) fn column<R: Record>(name: &str) -> Option<&'static Column> {
    R::COLUMNS.iter().find(|c| c.name == name)
}

/// Project `terms` onto `key`, in key order. Columns absent from `terms`
/// are skipped, so callers compare lengths to detect an incomplete key.
pub(crate) fn key_terms(terms: &[Term], key: &[&'static str]) -> Vec<Term> {
    key.iter()
        .filter_map(|col| terms.iter().find(|t| t.column == *col).cloned())
        .collect()
}

/// Overlay `patch` onto `current`, column by column.
pub(crate) fn merge_terms(current: Vec<Term>, patch: &[Term]) -> Vec<Term> {
    current
        .into_iter()
        .map(|term| {
            patch
                .iter()
                .find(|p| p.column == term.column)
                .cloned()
                .unwrap_or(term)
        })
        .collect()
}

pub(crate) fn push_text(terms: &mut Vec<Term>, column: &'static str, value: &Option<String>) {
    if let Some(text) = value {
        terms.push(Term::new(column, Value::Text(text.clone())));
    }
}

pub(crate) fn push_integer(terms: &mut Vec<Term>, column: &'static str, value: Option<i64>) {
    if let Some(n) = value {
        terms.push(Term::new(column, Value::Integer(n)));
    }
}
