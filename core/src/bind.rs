//! Parameter-safe statement assembly and placeholder rebinding.
//!
//! The statement compiler produces SQL with named placeholders (`:name`)
//! and a separate set of bound values. Before execution, [`Statement::bind`]
//! rewrites the named placeholders into the positional style of the target
//! backend and expands every list-valued parameter into one placeholder per
//! element, so `state IN (:state_in)` with three values becomes
//! `state IN (?1, ?2, ?3)` on SQLite or `state IN ($1, $2, $3)` on
//! PostgreSQL.

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::value::Value;

/// Positional placeholder syntax of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?1, ?2, ...` (SQLite).
    Question,
    /// `$1, $2, ...` (PostgreSQL).
    Dollar,
}

impl PlaceholderStyle {
    fn write(self, out: &mut String, index: usize) {
        let prefix = match self {
            Self::Question => '?',
            Self::Dollar => '$',
        };
        // Writing to a String cannot fail.
        let _ = write!(out, "{prefix}{index}");
    }
}

/// SQL text with named placeholders and their bound values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<(String, Value)>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends raw SQL text. Only identifiers and keywords go here; values
    /// are always added through [`bind_param`](Self::bind_param).
    pub fn push_sql(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// Binds `value` to the placeholder `:name`, replacing any previous
    /// binding of the same name.
    pub fn bind_param(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    /// Value bound to `name`, if any.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Rewrites named placeholders into `style` and returns the SQL with
    /// the positional argument list.
    ///
    /// Text inside single-quoted literals and double-quoted identifiers is
    /// left untouched, as are PostgreSQL `::type` casts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when a placeholder has no bound value or
    /// a list parameter is empty.
    pub fn bind(&self, style: PlaceholderStyle) -> Result<BoundStatement> {
        let bytes = self.sql.as_bytes();
        let mut sql = String::with_capacity(self.sql.len());
        let mut args = Vec::with_capacity(self.params.len());
        let mut quote: Option<u8> = None;
        let mut copied = 0;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            if let Some(q) = quote {
                if b == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match b {
                b'\'' | b'"' => {
                    quote = Some(b);
                    i += 1;
                }
                b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
                b':' if bytes.get(i + 1).is_some_and(|c| is_ident_start(*c)) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < bytes.len() && is_ident_char(bytes[end]) {
                        end += 1;
                    }
                    let name = &self.sql[start..end];
                    let value = self
                        .param(name)
                        .ok_or_else(|| Error::internal(format!("no value bound for :{name}")))?;

                    sql.push_str(&self.sql[copied..i]);
                    match value {
                        Value::List(items) if items.is_empty() => {
                            return Err(Error::internal(format!(
                                "empty list bound for :{name}"
                            )));
                        }
                        Value::List(items) => {
                            for (n, item) in items.iter().enumerate() {
                                if n > 0 {
                                    sql.push_str(", ");
                                }
                                args.push(item.clone());
                                style.write(&mut sql, args.len());
                            }
                        }
                        scalar => {
                            args.push(scalar.clone());
                            style.write(&mut sql, args.len());
                        }
                    }
                    copied = end;
                    i = end;
                }
                _ => i += 1,
            }
        }
        sql.push_str(&self.sql[copied..]);

        Ok(BoundStatement { sql, args })
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// SQL in a backend's positional style with its arguments in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub args: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_question_style() {
        let mut stmt = Statement::new("SELECT id FROM t WHERE a = :a AND b = :b");
        stmt.bind_param("a", 1_i64).bind_param("b", "x");
        let bound = stmt.bind(PlaceholderStyle::Question).unwrap();
        assert_eq!(bound.sql, "SELECT id FROM t WHERE a = ?1 AND b = ?2");
        assert_eq!(bound.args, vec![Value::Integer(1), Value::Text("x".into())]);
    }

    #[test]
    fn test_bind_expands_lists() {
        let mut stmt = Statement::new("SELECT id FROM t WHERE s IN (:s) AND v >= :v");
        stmt.bind_param("s", vec!["a", "b", "c"]).bind_param("v", 2_i64);
        let bound = stmt.bind(PlaceholderStyle::Dollar).unwrap();
        assert_eq!(
            bound.sql,
            "SELECT id FROM t WHERE s IN ($1, $2, $3) AND v >= $4"
        );
        assert_eq!(bound.args.len(), 4);
        assert_eq!(bound.args[3], Value::Integer(2));
    }

    #[test]
    fn test_bind_repeated_name_gets_fresh_positions() {
        let mut stmt = Statement::new("SELECT :x, :x");
        stmt.bind_param("x", 5_i64);
        let bound = stmt.bind(PlaceholderStyle::Question).unwrap();
        assert_eq!(bound.sql, "SELECT ?1, ?2");
        assert_eq!(bound.args, vec![Value::Integer(5), Value::Integer(5)]);
    }

    #[test]
    fn test_bind_skips_literals_and_casts() {
        let mut stmt = Statement::new("SELECT ':skip', \"a:b\", v::text FROM t WHERE id = :id");
        stmt.bind_param("id", "k");
        let bound = stmt.bind(PlaceholderStyle::Dollar).unwrap();
        assert_eq!(
            bound.sql,
            "SELECT ':skip', \"a:b\", v::text FROM t WHERE id = $1"
        );
        assert_eq!(bound.args.len(), 1);
    }

    #[test]
    fn test_bind_missing_param_is_internal() {
        let stmt = Statement::new("SELECT * FROM t WHERE id = :id");
        let err = stmt.bind(PlaceholderStyle::Question).unwrap_err();
        assert!(matches!(err, Error::Internal(m) if m.contains(":id")));
    }

    #[test]
    fn test_bind_empty_list_is_internal() {
        let mut stmt = Statement::new("SELECT * FROM t WHERE id IN (:ids)");
        stmt.bind_param("ids", Value::List(vec![]));
        assert!(stmt.bind(PlaceholderStyle::Question).is_err());
    }

    #[test]
    fn test_rebinding_replaces_value() {
        let mut stmt = Statement::new("SELECT :a");
        stmt.bind_param("a", 1_i64).bind_param("a", 2_i64);
        assert_eq!(stmt.params().len(), 1);
        assert_eq!(stmt.param("a"), Some(&Value::Integer(2)));
    }
}
