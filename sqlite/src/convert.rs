//! Conversion between portable [`Value`]s and SQLite storage values.
//!
//! SQLite has no boolean type: booleans are written as `0`/`1` and read
//! back as integers, which [`FromValue`](simplesql_core::FromValue) for
//! `bool` accepts.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Row, Statement};
use simplesql_core::{Error, Record, Result, Value};

/// Converts a bound argument into an owned SQLite value.
///
/// # Errors
///
/// Returns [`Error::Internal`] for a [`Value::List`]; lists must be
/// expanded by the binder before reaching the engine.
pub(crate) fn to_sql(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
        Value::List(_) => {
            return Err(Error::internal(
                "list value reached sqlite unexpanded".to_string(),
            ));
        }
    })
}

pub(crate) fn to_sql_args(args: &[Value]) -> Result<Vec<SqlValue>> {
    args.iter().map(to_sql).collect()
}

pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Column names of a prepared statement, in result order.
pub(crate) fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

/// Reads one result row into a [`Record`].
pub(crate) fn record_from_row(columns: &[String], row: &Row<'_>) -> rusqlite::Result<Record> {
    let mut values = Vec::with_capacity(columns.len());
    for idx in 0..columns.len() {
        values.push(from_sql(row.get_ref(idx)?));
    }
    Ok(Record::new(columns.to_vec(), values))
}
