//! Filter compilation
//!
//! Turns a [`Filter`] or a positional match into a SQL `WHERE` clause with
//! bound parameters. Column values are read through `COALESCE(col, '')` so
//! a NULL field behaves exactly like an empty one.

use rusqlite::types::Value;

use super::types::{FieldFilter, Filter, FIELD_COUNT};

pub(crate) const FIELD_COLUMNS: [&str; FIELD_COUNT] = ["v0", "v1", "v2", "v3", "v4", "v5"];

/// A compiled predicate: SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<Value>,
}

impl WhereClause {
    fn push(&mut self, predicate: &str) {
        if !self.sql.is_empty() {
            self.sql.push_str(" AND ");
        }
        self.sql.push_str(predicate);
    }

    fn push_eq(&mut self, column: &str, value: &str) {
        self.params.push(Value::Text(value.to_string()));
        let predicate = format!("{} = ?{}", column_expr(column), self.params.len());
        self.push(&predicate);
    }

    fn push_in(&mut self, column: &str, filter: &FieldFilter) {
        let FieldFilter::OneOf(values) = filter else {
            return;
        };
        if values.is_empty() {
            // Nothing can be a member of the empty set
            self.push("0");
            return;
        }

        let mut placeholders = Vec::with_capacity(values.len());
        for value in values {
            self.params.push(Value::Text(value.clone()));
            placeholders.push(format!("?{}", self.params.len()));
        }
        let predicate = format!("{} IN ({})", column_expr(column), placeholders.join(", "));
        self.push(&predicate);
    }

    /// `WHERE ...` suffix, or an empty string when nothing is constrained
    pub fn to_sql_suffix(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

fn column_expr(column: &str) -> String {
    if column == "ptype" {
        column.to_string()
    } else {
        format!("COALESCE({}, '')", column)
    }
}

/// Compile a load filter; unconstrained dimensions add nothing
pub fn compile_filter(filter: &Filter) -> WhereClause {
    let mut clause = WhereClause::default();
    clause.push_in("ptype", &filter.ptype);
    for (column, field) in FIELD_COLUMNS.iter().zip(filter.fields.iter()) {
        clause.push_in(column, field);
    }
    clause
}

/// Exact positional match over all six fields
///
/// Fields the rule doesn't supply must be empty in the row.
pub fn compile_exact(ptype: &str, fields: &[String; FIELD_COUNT]) -> WhereClause {
    let mut clause = WhereClause::default();
    clause.push_eq("ptype", ptype);
    for (column, value) in FIELD_COLUMNS.iter().zip(fields.iter()) {
        clause.push_eq(column, value);
    }
    clause
}

/// Positional match starting at `field_index`
///
/// Only the supplied, non-empty values constrain their columns; every other
/// field matches anything. The caller validates the index span.
pub fn compile_partial<S: AsRef<str>>(
    ptype: &str,
    field_index: usize,
    field_values: &[S],
) -> WhereClause {
    let mut clause = WhereClause::default();
    clause.push_eq("ptype", ptype);
    for (offset, value) in field_values.iter().enumerate() {
        let value = value.as_ref();
        if value.is_empty() {
            continue;
        }
        if let Some(column) = FIELD_COLUMNS.get(field_index + offset) {
            clause.push_eq(column, value);
        }
    }
    clause
}
