//! Statement compiler.
//!
//! Pure functions from a row or filter description (plus runtime values)
//! to a [`Statement`]. Nothing here touches a backend. Clauses are emitted
//! in field declaration order so the generated text is stable.

use crate::bind::Statement;
use crate::error::{Error, Result};
use crate::tag::{
    FilterDescription, FilterKind, FilterValue, Operator, Patch, Role, Row, RowDescription,
    LIMIT, TagError, validate_identifier,
};
use crate::value::Value;

/// Parameter name of the primary-key value in point statements. Parts of
/// a composite key are bound as `key_<column>`.
pub const KEY_PARAM: &str = "key";
/// Parameter name of the unique-name value in point reads.
pub const NAME_PARAM: &str = "name";
/// Parameter name of the expected version in guarded writes.
pub const EXPECTED_VERSION_PARAM: &str = "expected_version";

/// Returns the comma-separated column list and the matching named
/// placeholder list, e.g. `("id, version", ":id, :version")`.
pub fn columns_and_placeholders(desc: &RowDescription) -> (String, String) {
    let columns = desc.column_names();
    let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
    (columns.join(", "), placeholders.join(", "))
}

fn checked_table(table: &str) -> Result<&str> {
    validate_identifier(table).map_err(|e| Error::internal(e.to_string()))?;
    Ok(table)
}

/// `INSERT INTO <table> (<columns>) VALUES (<placeholders>)` bound to the
/// row's values.
pub fn insert<R: Row>(table: &str, desc: &RowDescription, row: &R) -> Result<Statement> {
    let table = checked_table(table)?;
    let (columns, placeholders) = columns_and_placeholders(desc);
    let mut stmt = Statement::new(format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders})"
    ));
    for column in desc.column_names() {
        let value = row
            .column_value(column)
            .ok_or_else(|| Error::internal(format!("row has no value for column {column}")))?;
        stmt.bind_param(column, value);
    }
    Ok(stmt)
}

/// `SELECT <columns> FROM <table> WHERE 1=1`, the base of every read.
pub fn select_base(table: &str, desc: &RowDescription) -> Result<Statement> {
    let table = checked_table(table)?;
    let (columns, _) = columns_and_placeholders(desc);
    Ok(Statement::new(format!(
        "SELECT {columns} FROM {table} WHERE 1=1"
    )))
}

fn push_live_only(stmt: &mut Statement, desc: &RowDescription) {
    if let Some(soft_delete) = desc.soft_delete() {
        stmt.push_sql(&format!(" AND {soft_delete} = FALSE"));
    }
}

/// Point read of a live row by the column carrying `role`.
fn select_one_by(
    table: &str,
    desc: &RowDescription,
    role: Role,
    param: &str,
    value: Value,
) -> Result<Statement> {
    let column = desc
        .require(role)
        .map_err(|e| Error::internal(e.to_string()))?;
    let mut stmt = select_base(table, desc)?;
    stmt.push_sql(&format!(" AND {column} = :{param}"));
    stmt.bind_param(param, value);
    push_live_only(&mut stmt, desc);
    Ok(stmt)
}

/// Pairs each primary-key column with its parameter name and value.
///
/// A single-column key binds as `:key`. A composite key is a
/// [`Value::List`] holding one value per key column, in declaration order,
/// and binds each part as `:key_<column>`.
fn key_bindings(desc: &RowDescription, key: Value) -> Result<Vec<(&str, String, Value)>> {
    let columns = desc.primary_keys();
    if columns.is_empty() {
        return Err(Error::internal(
            TagError::MissingRole(Role::PrimaryKey).to_string(),
        ));
    }
    let parts = match key {
        Value::List(parts) => parts,
        single => vec![single],
    };
    if parts.len() != columns.len() {
        return Err(Error::internal(format!(
            "key has {} part(s) but the row has {} primary key column(s)",
            parts.len(),
            columns.len()
        )));
    }
    let composite = columns.len() > 1;
    Ok(columns
        .into_iter()
        .zip(parts)
        .map(|(column, value)| {
            let param = if composite {
                format!("{KEY_PARAM}_{column}")
            } else {
                KEY_PARAM.to_string()
            };
            (column, param, value)
        })
        .collect())
}

/// Appends `k1 = :key_k1 AND k2 = :key_k2 ...` and binds the key parts.
fn push_key_match(stmt: &mut Statement, desc: &RowDescription, key: Value) -> Result<()> {
    let bindings = key_bindings(desc, key)?;
    let clause: Vec<String> = bindings
        .iter()
        .map(|(column, param, _)| format!("{column} = :{param}"))
        .collect();
    stmt.push_sql(&clause.join(" AND "));
    for (_, param, value) in bindings {
        stmt.bind_param(param, value);
    }
    Ok(())
}

/// Selects the live row whose primary key equals `key`.
pub fn select_by_primary_key(table: &str, desc: &RowDescription, key: Value) -> Result<Statement> {
    let mut stmt = select_base(table, desc)?;
    stmt.push_sql(" AND ");
    push_key_match(&mut stmt, desc, key)?;
    push_live_only(&mut stmt, desc);
    Ok(stmt)
}

/// Selects the live row whose unique-name column equals `name`.
pub fn select_by_unique_name(table: &str, desc: &RowDescription, name: Value) -> Result<Statement> {
    select_one_by(table, desc, Role::UniqueName, NAME_PARAM, name)
}

/// Compiles a filter into `SELECT ... WHERE 1=1 [AND ...]* [LIMIT :limit]`.
///
/// `value_of` supplies the runtime value of each declared filter field.
/// Absent fields contribute nothing. Unless a present `include_deleted`
/// field is true, rows flagged by the soft-delete column are excluded.
pub fn select_filtered<F>(
    table: &str,
    row: &RowDescription,
    filter: &FilterDescription,
    value_of: F,
) -> Result<Statement>
where
    F: Fn(&str) -> FilterValue,
{
    let mut stmt = select_base(table, row)?;
    let mut include_deleted = false;
    let mut limit: Option<Value> = None;

    for field in filter.fields() {
        let name = field.name();
        let value = value_of(name);
        match (field.kind(), value) {
            (_, FilterValue::Absent) => {}
            (FilterKind::IncludeDeleted, FilterValue::Scalar(v)) => {
                include_deleted = matches!(v, Value::Bool(true)) || v == Value::Integer(1);
            }
            (FilterKind::Limit, FilterValue::Scalar(v)) => {
                if matches!(v, Value::Integer(n) if n > 0) {
                    limit = Some(v);
                }
            }
            (FilterKind::Predicate { column, operator }, FilterValue::List(items)) => {
                let keyword = match operator {
                    Operator::NotIn => "NOT IN",
                    // A collection bound to a scalar operator is treated
                    // as membership.
                    _ => "IN",
                };
                stmt.push_sql(&format!(" AND {column} {keyword} (:{name})"));
                stmt.bind_param(name, Value::List(items));
            }
            (FilterKind::Predicate { column, operator }, FilterValue::Scalar(v)) => {
                if operator.is_collection() {
                    let keyword = operator.sql();
                    stmt.push_sql(&format!(" AND {column} {keyword} (:{name})"));
                    stmt.bind_param(name, Value::List(vec![v]));
                } else {
                    stmt.push_sql(&format!(" AND {column} {} :{name}", operator.sql()));
                    stmt.bind_param(name, v);
                }
            }
            (kind, value) => {
                return Err(Error::internal(format!(
                    "filter field {name} ({kind:?}) cannot take {value:?}"
                )));
            }
        }
    }

    if !include_deleted {
        push_live_only(&mut stmt, row);
    }
    if let Some(limit) = limit {
        stmt.push_sql(&format!(" LIMIT :{LIMIT}"));
        stmt.bind_param(LIMIT, limit);
    }
    Ok(stmt)
}

fn version_column(desc: &RowDescription) -> Result<&str> {
    desc.require(Role::Version)
        .map_err(|e| Error::internal(e.to_string()))
}

/// Versions are stored as signed 64-bit integers; anything larger can
/// never match and is rejected rather than clamped.
fn expected_version_value(expected_version: u64) -> Result<Value> {
    i64::try_from(expected_version)
        .map(Value::Integer)
        .map_err(|_| {
            Error::internal(format!(
                "expected version {expected_version} exceeds the storable range"
            ))
        })
}

/// Appends `WHERE <key match> AND version = :expected_version`.
fn push_version_guard(
    stmt: &mut Statement,
    desc: &RowDescription,
    version: &str,
    key: Value,
    expected_version: u64,
) -> Result<()> {
    let expected = expected_version_value(expected_version)?;
    stmt.push_sql(" WHERE ");
    push_key_match(stmt, desc, key)?;
    stmt.push_sql(&format!(" AND {version} = :{EXPECTED_VERSION_PARAM}"));
    stmt.bind_param(EXPECTED_VERSION_PARAM, expected);
    Ok(())
}

/// `UPDATE <table> SET version = version + 1[, col = :update_col]* WHERE
/// <pk> = :key AND version = :expected_version AND <soft_delete> = FALSE`.
///
/// A composite key matches every key column (see [`select_by_primary_key`]).
///
/// Only assignments carrying a value contribute a SET clause. Assignments
/// may target plain and unique-name columns; the key, version and
/// soft-delete columns are owned by the executor.
pub fn update<P: Patch + ?Sized>(
    table: &str,
    desc: &RowDescription,
    key: Value,
    expected_version: u64,
    patch: &P,
) -> Result<Statement> {
    let table = checked_table(table)?;
    let version = version_column(desc)?;
    let mut stmt = Statement::new(format!("UPDATE {table} SET {version} = {version} + 1"));

    for (column, value) in patch.assignments() {
        let Some(value) = value else {
            continue;
        };
        match desc.role_of(column) {
            Some(Role::Plain | Role::UniqueName) => {}
            Some(role) => {
                return Err(Error::internal(format!(
                    "column {column} is the {role} column and cannot be assigned"
                )));
            }
            None => {
                return Err(Error::internal(format!(
                    "table {table} has no column {column}"
                )));
            }
        }
        let param = format!("update_{column}");
        stmt.push_sql(&format!(", {column} = :{param}"));
        stmt.bind_param(param, value);
    }

    push_version_guard(&mut stmt, desc, version, key, expected_version)?;
    push_live_only(&mut stmt, desc);
    Ok(stmt)
}

/// Same shape as [`update`] but sets the soft-delete column to true.
pub fn soft_delete(
    table: &str,
    desc: &RowDescription,
    key: Value,
    expected_version: u64,
) -> Result<Statement> {
    let table = checked_table(table)?;
    let version = version_column(desc)?;
    let flag = desc
        .require(Role::SoftDelete)
        .map_err(|e| Error::internal(e.to_string()))?;
    let mut stmt = Statement::new(format!(
        "UPDATE {table} SET {version} = {version} + 1, {flag} = TRUE"
    ));
    push_version_guard(&mut stmt, desc, version, key, expected_version)?;
    push_live_only(&mut stmt, desc);
    Ok(stmt)
}

/// `DELETE FROM <table> WHERE <pk> = :key AND version = :expected_version`.
///
/// Physically removes the row, soft-deleted or not.
pub fn purge(
    table: &str,
    desc: &RowDescription,
    key: Value,
    expected_version: u64,
) -> Result<Statement> {
    let table = checked_table(table)?;
    let version = version_column(desc)?;
    let mut stmt = Statement::new(format!("DELETE FROM {table}"));
    push_version_guard(&mut stmt, desc, version, key, expected_version)?;
    Ok(stmt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Changeset, Field, FilterField};

    fn cluster() -> RowDescription {
        RowDescription::builder()
            .field(Field::new("id", "id").primary_key())
            .field(Field::new("version", "version").version())
            .field(Field::new("name", "name").unique_name())
            .field(Field::new("state", "state"))
            .field(Field::new("message", "message"))
            .field(Field::new("is_deleted", "is_deleted").soft_delete())
            .build()
            .unwrap()
    }

    fn filters() -> FilterDescription {
        FilterDescription::builder()
            .field(FilterField::tagged("id_in", "id:in").unwrap())
            .field(FilterField::tagged("state_in", "state:in").unwrap())
            .field(FilterField::tagged("state_not_in", "state:not_in").unwrap())
            .field(FilterField::tagged("version_gte", "version:gte").unwrap())
            .field(FilterField::tagged("version_eq", "version:eq").unwrap())
            .field(FilterField::include_deleted())
            .field(FilterField::limit())
            .build()
            .unwrap()
    }

    #[test]
    fn test_columns_and_placeholders() {
        let (columns, placeholders) = columns_and_placeholders(&cluster());
        assert_eq!(columns, "id, version, name, state, message, is_deleted");
        assert_eq!(
            placeholders,
            ":id, :version, :name, :state, :message, :is_deleted"
        );
    }

    #[test]
    fn test_empty_filter_only_excludes_deleted() {
        let stmt = select_filtered("cluster", &cluster(), &filters(), |_| FilterValue::Absent)
            .unwrap();
        assert_eq!(
            stmt.sql(),
            "SELECT id, version, name, state, message, is_deleted FROM cluster WHERE 1=1 AND is_deleted = FALSE"
        );
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn test_filter_clauses_follow_declaration_order() {
        let stmt = select_filtered("cluster", &cluster(), &filters(), |field| match field {
            "limit" => FilterValue::Scalar(Value::Integer(3)),
            "state_not_in" => FilterValue::list(["failed"]),
            "version_gte" => FilterValue::optional(Some(2_u64)),
            "state_in" => FilterValue::list(["active", "inactive"]),
            _ => FilterValue::Absent,
        })
        .unwrap();
        assert!(stmt.sql().ends_with(
            "WHERE 1=1 AND state IN (:state_in) AND state NOT IN (:state_not_in) \
             AND version >= :version_gte AND is_deleted = FALSE LIMIT :limit"
        ));
        assert_eq!(
            stmt.param("state_in"),
            Some(&Value::List(vec!["active".into(), "inactive".into()]))
        );
        assert_eq!(stmt.param("limit"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_include_deleted_drops_flag_clause() {
        let stmt = select_filtered("cluster", &cluster(), &filters(), |field| match field {
            "include_deleted" => FilterValue::Scalar(Value::Bool(true)),
            _ => FilterValue::Absent,
        })
        .unwrap();
        assert!(!stmt.sql().contains("is_deleted = FALSE"));

        let stmt = select_filtered("cluster", &cluster(), &filters(), |field| match field {
            "include_deleted" => FilterValue::Scalar(Value::Bool(false)),
            _ => FilterValue::Absent,
        })
        .unwrap();
        assert!(stmt.sql().ends_with("AND is_deleted = FALSE"));
    }

    #[test]
    fn test_zero_limit_is_ignored() {
        let stmt = select_filtered("cluster", &cluster(), &filters(), |field| match field {
            "limit" => FilterValue::Scalar(Value::Integer(0)),
            _ => FilterValue::Absent,
        })
        .unwrap();
        assert!(!stmt.sql().contains("LIMIT"));
    }

    #[test]
    fn test_point_reads() {
        let stmt = select_by_primary_key("cluster", &cluster(), "a".into()).unwrap();
        assert!(stmt.sql().ends_with("WHERE 1=1 AND id = :key AND is_deleted = FALSE"));
        let stmt = select_by_unique_name("cluster", &cluster(), "n".into()).unwrap();
        assert!(stmt.sql().ends_with("WHERE 1=1 AND name = :name AND is_deleted = FALSE"));
    }

    #[test]
    fn test_update_sets_only_present_fields() {
        let patch = Changeset::new()
            .set_opt("state", Some("inactive"))
            .set_opt("message", None::<String>);
        let stmt = update("cluster", &cluster(), "a".into(), 4, &patch).unwrap();
        assert_eq!(
            stmt.sql(),
            "UPDATE cluster SET version = version + 1, state = :update_state \
             WHERE id = :key AND version = :expected_version AND is_deleted = FALSE"
        );
        assert_eq!(stmt.param("expected_version"), Some(&Value::Integer(4)));
        assert!(stmt.param("update_message").is_none());
    }

    #[test]
    fn test_update_rejects_owned_and_unknown_columns() {
        let patch = Changeset::new().set("version", 9_i64);
        assert!(update("cluster", &cluster(), "a".into(), 0, &patch).is_err());
        let patch = Changeset::new().set("nope", 1_i64);
        assert!(update("cluster", &cluster(), "a".into(), 0, &patch).is_err());
    }

    #[test]
    fn test_soft_delete_statement() {
        let stmt = soft_delete("cluster", &cluster(), "a".into(), 1).unwrap();
        assert_eq!(
            stmt.sql(),
            "UPDATE cluster SET version = version + 1, is_deleted = TRUE \
             WHERE id = :key AND version = :expected_version AND is_deleted = FALSE"
        );
    }

    #[test]
    fn test_purge_statement() {
        let stmt = purge("cluster", &cluster(), "a".into(), 1).unwrap();
        assert_eq!(
            stmt.sql(),
            "DELETE FROM cluster WHERE id = :key AND version = :expected_version"
        );
    }

    fn node() -> RowDescription {
        RowDescription::builder()
            .field(Field::new("cluster_id", "cluster_id").primary_key())
            .field(Field::new("node_id", "node_id").primary_key())
            .field(Field::new("version", "version").version())
            .field(Field::new("state", "state"))
            .field(Field::new("is_deleted", "is_deleted").soft_delete())
            .build()
            .unwrap()
    }

    #[test]
    fn test_composite_key_matches_every_key_column() {
        let stmt = select_by_primary_key("node", &node(), ("c1", 2).into()).unwrap();
        assert!(stmt.sql().ends_with(
            "WHERE 1=1 AND cluster_id = :key_cluster_id AND node_id = :key_node_id \
             AND is_deleted = FALSE"
        ));
        assert_eq!(stmt.param("key_node_id"), Some(&Value::Integer(2)));

        let patch = Changeset::new().set("state", "drained");
        let stmt = update("node", &node(), ("c1", 2).into(), 3, &patch).unwrap();
        assert_eq!(
            stmt.sql(),
            "UPDATE node SET version = version + 1, state = :update_state \
             WHERE cluster_id = :key_cluster_id AND node_id = :key_node_id \
             AND version = :expected_version AND is_deleted = FALSE"
        );

        let stmt = purge("node", &node(), ("c1", 2).into(), 3).unwrap();
        assert_eq!(
            stmt.sql(),
            "DELETE FROM node WHERE cluster_id = :key_cluster_id \
             AND node_id = :key_node_id AND version = :expected_version"
        );
    }

    #[test]
    fn test_key_must_cover_every_key_column() {
        assert!(select_by_primary_key("node", &node(), "c1".into()).is_err());
        assert!(soft_delete("node", &node(), ("c1", 2, 3).into(), 1).is_err());
        assert!(select_by_primary_key("cluster", &cluster(), ("a", "b").into()).is_err());
    }

    #[test]
    fn test_out_of_range_expected_version_is_rejected() {
        let patch = Changeset::new().set("state", "x");
        let err = update("cluster", &cluster(), "a".into(), u64::MAX, &patch).unwrap_err();
        assert!(err.message().contains("exceeds the storable range"));
        assert!(purge("cluster", &cluster(), "a".into(), u64::MAX).is_err());
    }

    #[test]
    fn test_invalid_table_name() {
        assert!(select_base("cluster; --", &cluster()).is_err());
    }
}
