//! Integration tests for the simplesql-postgres crate.
//!
//! These need a running server and are skipped unless
//! `SIMPLESQL_TEST_POSTGRES_URL` is set. Each test works in its own schema.

use std::time::{Duration, Instant};

use simplesql_core::{
    Backend, CancelToken, Changeset, Context, Database, Field, Filter, FilterDescription,
    FilterField, FilterValue, Migration, NoFilter, Record, Row, RowDescription, Table, TagError,
    Value,
};
use simplesql_postgres::PostgresBackend;

const URL_VAR: &str = "SIMPLESQL_TEST_POSTGRES_URL";

#[derive(Debug, Clone, PartialEq)]
struct ClusterRow {
    id: String,
    version: u64,
    name: String,
    state: String,
    is_deleted: bool,
}

impl ClusterRow {
    fn new(id: &str, state: &str) -> Self {
        Self {
            id: id.to_string(),
            version: 1,
            name: format!("cluster-{id}"),
            state: state.to_string(),
            is_deleted: false,
        }
    }
}

impl Row for ClusterRow {
    fn describe() -> Result<RowDescription, TagError> {
        RowDescription::builder()
            .field(Field::new("id", "id").primary_key())
            .field(Field::new("version", "version").version())
            .field(Field::new("name", "name").unique_name())
            .field(Field::new("state", "state"))
            .field(Field::new("is_deleted", "is_deleted").soft_delete())
            .build()
    }

    fn column_value(&self, column: &str) -> Option<Value> {
        Some(match column {
            "id" => self.id.clone().into(),
            "version" => self.version.into(),
            "name" => self.name.clone().into(),
            "state" => self.state.clone().into(),
            "is_deleted" => self.is_deleted.into(),
            _ => return None,
        })
    }

    fn from_record(record: &Record) -> simplesql_core::Result<Self> {
        Ok(Self {
            id: record.get("id")?,
            version: record.get("version")?,
            name: record.get("name")?,
            state: record.get("state")?,
            is_deleted: record.get("is_deleted")?,
        })
    }
}

#[derive(Debug, Default)]
struct ClusterFilter {
    state_in: Vec<String>,
    include_deleted: bool,
    limit: u64,
}

impl Filter for ClusterFilter {
    fn describe() -> Result<FilterDescription, TagError> {
        FilterDescription::builder()
            .field(FilterField::tagged("state_in", "state:in")?)
            .field(FilterField::include_deleted())
            .field(FilterField::limit())
            .build()
    }

    fn filter_value(&self, field: &str) -> FilterValue {
        match field {
            "state_in" => FilterValue::list(self.state_in.clone()),
            "include_deleted" => FilterValue::Scalar(self.include_deleted.into()),
            "limit" => FilterValue::Scalar(self.limit.into()),
            _ => FilterValue::Absent,
        }
    }
}

fn migrations() -> Vec<Migration> {
    vec![Migration::new(
        1,
        "CREATE TABLE cluster (
            id TEXT PRIMARY KEY,
            version BIGINT NOT NULL,
            name TEXT NOT NULL UNIQUE,
            state TEXT NOT NULL,
            is_deleted BOOLEAN NOT NULL DEFAULT FALSE
        );",
        "DROP TABLE cluster;",
    )]
}

/// Connects into a fresh schema named after the test, or `None` when no
/// server is configured.
fn setup(schema: &str) -> Option<Database<PostgresBackend>> {
    let url = std::env::var(URL_VAR).ok()?;
    let mut backend = PostgresBackend::connect(&url).unwrap();
    backend
        .client_mut()
        .batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {schema} CASCADE; CREATE SCHEMA {schema}; SET search_path TO {schema};"
        ))
        .unwrap();
    let mut db = Database::new(backend);
    db.apply_migrations(&Context::background(), &migrations())
        .unwrap();
    Some(db)
}

fn clusters() -> Table<ClusterRow, ClusterFilter> {
    Table::new("cluster").unwrap()
}

#[test]
fn test_pg_crud_and_optimistic_lock() {
    let Some(mut db) = setup("simplesql_crud") else {
        eprintln!("{URL_VAR} not set, skipping");
        return;
    };
    let table = clusters();
    let ctx = Context::background();

    db.insert(&ctx, &table, &ClusterRow::new("a", "active"))
        .unwrap();
    assert!(
        db.insert(&ctx, &table, &ClusterRow::new("a", "active"))
            .unwrap_err()
            .is_conflict()
    );

    db.update(&ctx, &table, "a", 1, &Changeset::new().set("state", "inactive"))
        .unwrap();
    let stale = db
        .update(&ctx, &table, "a", 1, &Changeset::new().set("state", "x"))
        .unwrap_err();
    assert!(stale.is_conflict());

    let loaded = db.get_by_unique_name(&ctx, &table, "cluster-a").unwrap();
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.state, "inactive");

    db.soft_delete(&ctx, &table, "a", 2).unwrap();
    assert!(
        db.get_by_primary_key(&ctx, &table, "a")
            .unwrap_err()
            .is_not_found()
    );
    db.purge(&ctx, &table, "a", 3).unwrap();
}

#[test]
fn test_pg_ten_row_scenario() {
    let Some(mut db) = setup("simplesql_scenario") else {
        eprintln!("{URL_VAR} not set, skipping");
        return;
    };
    let table = clusters();
    let ctx = Context::background();
    for (i, id) in ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]
        .iter()
        .enumerate()
    {
        let state = if i % 2 == 0 { "active" } else { "inactive" };
        db.insert(&ctx, &table, &ClusterRow::new(id, state)).unwrap();
    }

    let active = db
        .list(
            &ctx,
            &table,
            &ClusterFilter {
                state_in: vec!["active".into()],
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(active.len(), 5);

    db.soft_delete(&ctx, &table, "a", 1).unwrap();
    assert_eq!(db.list(&ctx, &table, &ClusterFilter::default()).unwrap().len(), 9);
    let all = db
        .list(
            &ctx,
            &table,
            &ClusterFilter {
                include_deleted: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(all.len(), 10);

    let limited = db
        .list(
            &ctx,
            &table,
            &ClusterFilter {
                limit: 2,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn test_pg_migrations_idempotent_and_revertible() {
    let Some(mut db) = setup("simplesql_migrate") else {
        eprintln!("{URL_VAR} not set, skipping");
        return;
    };
    let ctx = Context::background();

    let again = db.apply_migrations(&ctx, &migrations()).unwrap();
    assert!(again.applied.is_empty());
    assert_eq!(again.to, 1);

    let reverted = db.revert_migrations(&ctx, &migrations(), 0).unwrap();
    assert_eq!(reverted.applied, vec![1]);
    let status = db.migration_status(&ctx, &migrations()).unwrap();
    assert_eq!(status.current_version, 0);
    assert_eq!(status.pending, vec![1]);
}

#[test]
fn test_pg_cancel_and_deadline_stop_running_statement() {
    let Some(mut db) = setup("simplesql_cancel") else {
        eprintln!("{URL_VAR} not set, skipping");
        return;
    };
    let backend = db.backend_mut();

    let token = CancelToken::new();
    let ctx = Context::background().with_cancel(token.clone());
    let canceler = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        token.cancel();
    });
    let started = Instant::now();
    let err = backend
        .execute_batch(&ctx, "SELECT pg_sleep(30)")
        .unwrap_err();
    canceler.join().unwrap();
    assert_eq!(err.message(), "operation canceled");
    assert!(started.elapsed() < Duration::from_secs(10));

    let ctx = Context::background().with_timeout(Duration::from_millis(100));
    let started = Instant::now();
    let err = backend
        .execute_batch(&ctx, "SELECT pg_sleep(30)")
        .unwrap_err();
    assert_eq!(err.message(), "deadline exceeded");
    assert!(started.elapsed() < Duration::from_secs(10));

    // The session is still usable afterwards.
    backend
        .execute_batch(&Context::background(), "SELECT 1")
        .unwrap();
}

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    id: String,
    version: u64,
    amount: String,
    taken_on: String,
    taken_at: String,
    payload: String,
    is_deleted: bool,
}

impl Row for Reading {
    fn describe() -> Result<RowDescription, TagError> {
        RowDescription::builder()
            .field(Field::new("id", "id").primary_key())
            .field(Field::new("version", "version").version())
            .field(Field::new("amount", "amount"))
            .field(Field::new("taken_on", "taken_on"))
            .field(Field::new("taken_at", "taken_at"))
            .field(Field::new("payload", "payload"))
            .field(Field::new("is_deleted", "is_deleted").soft_delete())
            .build()
    }

    fn column_value(&self, column: &str) -> Option<Value> {
        Some(match column {
            "id" => self.id.clone().into(),
            "version" => self.version.into(),
            "amount" => self.amount.clone().into(),
            "taken_on" => self.taken_on.clone().into(),
            "taken_at" => self.taken_at.clone().into(),
            "payload" => self.payload.clone().into(),
            "is_deleted" => self.is_deleted.into(),
            _ => return None,
        })
    }

    fn from_record(record: &Record) -> simplesql_core::Result<Self> {
        Ok(Self {
            id: record.get("id")?,
            version: record.get("version")?,
            amount: record.get("amount")?,
            taken_on: record.get("taken_on")?,
            taken_at: record.get("taken_at")?,
            payload: record.get("payload")?,
            is_deleted: record.get("is_deleted")?,
        })
    }
}

#[test]
fn test_pg_typed_columns_round_trip_as_text() {
    let Some(mut db) = setup("simplesql_types") else {
        eprintln!("{URL_VAR} not set, skipping");
        return;
    };
    let ctx = Context::background();
    db.backend_mut()
        .execute_batch(
            &ctx,
            "CREATE TABLE reading (
                id UUID PRIMARY KEY,
                version BIGINT NOT NULL,
                amount NUMERIC(10, 2) NOT NULL,
                taken_on DATE NOT NULL,
                taken_at TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL,
                is_deleted BOOLEAN NOT NULL DEFAULT FALSE
            );",
        )
        .unwrap();
    let readings: Table<Reading> = Table::new("reading").unwrap();
    let id = "6f1c0e2a-8a4b-4c1e-9d4f-0b7a3c2e1d00";
    let reading = Reading {
        id: id.to_string(),
        version: 1,
        amount: "12.50".into(),
        taken_on: "2024-05-01".into(),
        taken_at: "2024-05-01T10:00:00+00:00".into(),
        payload: r#"{"k":1}"#.into(),
        is_deleted: false,
    };
    db.insert(&ctx, &readings, &reading).unwrap();

    let loaded = db.get_by_primary_key(&ctx, &readings, id).unwrap();
    assert_eq!(loaded, reading);

    db.update(&ctx, &readings, id, 1, &Changeset::new().set("amount", "99.99"))
        .unwrap();
    let listed = db.list(&ctx, &readings, &NoFilter).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].amount, "99.99");
    assert_eq!(listed[0].version, 2);
}
