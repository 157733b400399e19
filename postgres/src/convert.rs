//! Conversion between portable [`Value`]s and PostgreSQL wire types.
//!
//! Integers and floats are narrowed to the parameter type the server
//! inferred, so `Value::Integer` binds to `INT2`, `INT4` or `INT8` columns
//! alike. `NUMERIC`, date/time, `UUID` and `JSON` columns have no portable
//! counterpart: they are read back as text and text parameters are parsed
//! into them.

use std::error::Error as StdError;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use postgres::Row;
use postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use rust_decimal::Decimal;
use simplesql_core::{Error, Record, Result, Value};
use uuid::Uuid;

type BoxError = Box<dyn StdError + Sync + Send>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Borrowed [`Value`] bound as a statement parameter.
#[derive(Debug)]
pub(crate) struct PgValue<'a>(pub(crate) &'a Value);

impl ToSql for PgValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => {
                if *ty == Type::BOOL {
                    b.to_sql(ty, out)
                } else {
                    integer_to_sql(i64::from(*b), ty, out)
                }
            }
            Value::Integer(i) => integer_to_sql(*i, ty, out),
            Value::Real(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::try_from(*f)?.to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Value::Text(s) => text_to_sql(s, ty, out),
            Value::Blob(b) => b.as_slice().to_sql(ty, out),
            Value::List(_) => Err("list value reached postgres unexpanded".into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn integer_to_sql(i: i64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if *ty == Type::BOOL {
        (i != 0).to_sql(ty, out)
    } else if *ty == Type::INT2 {
        i16::try_from(i)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(i)?.to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (i as f64).to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        Decimal::from(i).to_sql(ty, out)
    } else {
        i.to_sql(ty, out)
    }
}

/// Writes text into a parameter of the server-inferred type, parsing it
/// for the types that are read back as text.
fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if *ty == Type::NUMERIC {
        Decimal::from_str(s)?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMPTZ {
        DateTime::parse_from_rfc3339(s)?
            .with_timezone(&Utc)
            .to_sql(ty, out)
    } else if *ty == Type::TIMESTAMP {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)?.to_sql(ty, out)
    } else if *ty == Type::DATE {
        NaiveDate::from_str(s)?.to_sql(ty, out)
    } else if *ty == Type::TIME {
        NaiveTime::from_str(s)?.to_sql(ty, out)
    } else if *ty == Type::UUID {
        Uuid::parse_str(s)?.to_sql(ty, out)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
    } else {
        s.to_sql(ty, out)
    }
}

/// Rejects list arguments before any round trip.
pub(crate) fn params(args: &[Value]) -> Result<Vec<PgValue<'_>>> {
    args.iter()
        .map(|v| match v {
            Value::List(_) => Err(Error::internal("list value reached postgres unexpanded")),
            _ => Ok(PgValue(v)),
        })
        .collect()
}

/// A result column decoded by its declared type.
///
/// Types without a portable counterpart are rendered as text: `NUMERIC`
/// in plain decimal notation, `TIMESTAMPTZ` as RFC 3339 in UTC,
/// `TIMESTAMP` as `YYYY-MM-DD HH:MM:SS[.ffffff]`, `DATE` and `TIME` in ISO
/// form, `UUID` hyphenated and `JSON`/`JSONB` as compact JSON.
struct Column(Value);

impl<'a> FromSql<'a> for Column {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        decode(ty, raw).map(Column)
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, BoxError> {
        Ok(Column(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Decodes one non-null binary column value.
fn decode(ty: &Type, raw: &[u8]) -> std::result::Result<Value, BoxError> {
    let value = if *ty == Type::BOOL {
        bool::from_sql(ty, raw)?.into()
    } else if *ty == Type::INT2 {
        i16::from_sql(ty, raw)?.into()
    } else if *ty == Type::INT4 {
        i32::from_sql(ty, raw)?.into()
    } else if *ty == Type::INT8 {
        i64::from_sql(ty, raw)?.into()
    } else if *ty == Type::OID {
        u32::from_sql(ty, raw)?.into()
    } else if *ty == Type::FLOAT4 {
        f64::from(f32::from_sql(ty, raw)?).into()
    } else if *ty == Type::FLOAT8 {
        f64::from_sql(ty, raw)?.into()
    } else if *ty == Type::BYTEA {
        Value::Blob(Vec::<u8>::from_sql(ty, raw)?)
    } else if *ty == Type::NUMERIC {
        Decimal::from_sql(ty, raw)?.to_string().into()
    } else if *ty == Type::TIMESTAMPTZ {
        DateTime::<Utc>::from_sql(ty, raw)?
            .to_rfc3339_opts(SecondsFormat::AutoSi, false)
            .into()
    } else if *ty == Type::TIMESTAMP {
        NaiveDateTime::from_sql(ty, raw)?
            .format(TIMESTAMP_FORMAT)
            .to_string()
            .into()
    } else if *ty == Type::DATE {
        NaiveDate::from_sql(ty, raw)?.to_string().into()
    } else if *ty == Type::TIME {
        NaiveTime::from_sql(ty, raw)?.to_string().into()
    } else if *ty == Type::UUID {
        Uuid::from_sql(ty, raw)?.to_string().into()
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        serde_json::Value::from_sql(ty, raw)?.to_string().into()
    } else if <&str as FromSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_)) {
        <&str as FromSql>::from_sql(ty, raw)?.into()
    } else {
        return Err(format!("unsupported column type {ty}").into());
    };
    Ok(value)
}

/// Converts one result row into a [`Record`].
pub(crate) fn record_from_row(row: &Row) -> std::result::Result<Record, postgres::Error> {
    let columns = row.columns();
    let mut names = Vec::with_capacity(columns.len());
    let mut values = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        names.push(column.name().to_string());
        values.push(row.try_get::<_, Column>(idx)?.0);
    }
    Ok(Record::new(names, values))
}
