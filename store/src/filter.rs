//! Predicate construction for owner-scoped queries.
//!
//! A list of filter records becomes a disjunction of conjunctions: records are
//! OR-ed together and the fields set within one record are AND-ed. The whole
//! disjunction is AND-ed with `owner = ?`. A record with no field set is
//! rejected rather than silently matching every row.
//!
//! Values are always bound as parameters. Column names come from the static
//! descriptors in [`crate::record`], never from caller input.

use sqlx::{QueryBuilder, Sqlite};

use crate::error::StoreError;
use crate::record::Fields;

/// A column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Integer(i64),
    Text(String),
}

impl Value {
    pub(crate) fn is_empty_text(&self) -> bool {
        matches!(self, Value::Text(text) if text.is_empty())
    }
}

/// One `column = value` test.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    pub column: &'static str,
    pub value: Value,
}

impl Term {
    pub fn new(column: &'static str, value: Value) -> Self {
        Self { column, value }
    }

    pub fn id(id: i64) -> Self {
        Self::new("id", Value::Integer(id))
    }
}

/// A WHERE clause: optional owner scope, OR of AND-ed term lists, and an
/// optional id to leave out of the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    owner: Option<String>,
    clauses: Vec<Vec<Term>>,
    exclude_id: Option<i64>,
}

impl Predicate {
    /// Rows of `owner` matching any of `clauses`; every row of `owner` when
    /// `clauses` is empty.
    pub(crate) fn scoped(owner: &str, clauses: Vec<Vec<Term>>) -> Self {
        Self {
            owner: Some(owner.to_string()),
            clauses,
            exclude_id: None,
        }
    }

    pub(crate) fn unscoped(clauses: Vec<Vec<Term>>) -> Self {
        Self {
            owner: None,
            clauses,
            exclude_id: None,
        }
    }

    pub(crate) fn by_id(owner: &str, id: i64) -> Self {
        Self::scoped(owner, vec![vec![Term::id(id)]])
    }

    pub(crate) fn excluding(mut self, id: i64) -> Self {
        self.exclude_id = Some(id);
        self
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn clauses(&self) -> &[Vec<Term>] {
        &self.clauses
    }

    /// Append ` WHERE ...` to `builder`. Nothing is appended for an unscoped
    /// predicate with no clauses.
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        let mut has_where = false;

        if let Some(owner) = &self.owner {
            push_condition(builder, &mut has_where);
            builder.push("owner = ").push_bind(owner.clone());
        }

        if let Some(id) = self.exclude_id {
            push_condition(builder, &mut has_where);
            builder.push("id <> ").push_bind(id);
        }

        if !self.clauses.is_empty() {
            push_condition(builder, &mut has_where);
            push_disjunction(builder, &self.clauses);
        }
    }
}

/// Render `clauses` as a balanced tree of ORs. SQLite caps expression depth
/// at 1000, which a flat chain of one OR per clause would exceed on large
/// batches; the balanced form stays logarithmic.
fn push_disjunction(builder: &mut QueryBuilder<'_, Sqlite>, clauses: &[Vec<Term>]) {
    match clauses {
        [] => {}
        [clause] => {
            builder.push("(");
            for (j, term) in clause.iter().enumerate() {
                if j > 0 {
                    builder.push(" AND ");
                }
                builder.push(term.column).push(" = ");
                push_value(builder, &term.value);
            }
            builder.push(")");
        }
        _ => {
            let (left, right) = clauses.split_at(clauses.len() / 2);
            builder.push("(");
            push_disjunction(builder, left);
            builder.push(" OR ");
            push_disjunction(builder, right);
            builder.push(")");
        }
    }
}

fn push_condition(builder: &mut QueryBuilder<'_, Sqlite>, has_where: &mut bool) {
    if *has_where {
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
        *has_where = true;
    }
}

/// Bind `value` at the builder's current position.
pub(crate) fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Integer(n) => {
            builder.push_bind(*n);
        }
        Value::Text(text) => {
            builder.push_bind(text.clone());
        }
    }
}

/// Terms a record contributes to a filter: its id if set, then every data
/// field that is set. Empty strings count as unset.
pub(crate) fn filter_terms<F: Fields>(record: &F) -> Vec<Term> {
    let mut terms = Vec::new();
    if let Some(id) = record.id() {
        terms.push(Term::id(id));
    }
    terms.extend(
        record
            .terms()
            .into_iter()
            .filter(|t| !t.value.is_empty_text()),
    );
    terms
}

fn clauses<F: Fields>(entity: &'static str, records: &[F]) -> Result<Vec<Vec<Term>>, StoreError> {
    records
        .iter()
        .map(|record| {
            let terms = filter_terms(record);
            if terms.is_empty() {
                return Err(StoreError::InvalidFilter {
                    entity,
                    record: format!("{:?}", record),
                });
            }
            Ok(terms)
        })
        .collect()
}

/// Build the owner-scoped predicate for `records`.
///
/// An empty slice matches every row of `owner`. Otherwise each record must
/// set at least one field, or the call fails with
/// [`StoreError::InvalidFilter`].
pub fn build_filter<F: Fields>(
    entity: &'static str,
    owner: &str,
    records: &[F],
) -> Result<Predicate, StoreError> {
    Ok(Predicate::scoped(owner, clauses(entity, records)?))
}

/// Same as [`build_filter`] for reference tables that have no owner column.
pub fn build_unscoped_filter<F: Fields>(
    entity: &'static str,
    records: &[F],
) -> Result<Predicate, StoreError> {
    Ok(Predicate::unscoped(clauses(entity, records)?))
}
