//! Row and filter descriptions.
//!
//! A row type declares, once, which of its fields map to SQL columns and
//! which special role each column plays. A filter type declares which of its
//! fields become WHERE predicates and with which operator. Descriptions are
//! validated when they are built, so a malformed shape fails when its
//! [`Table`](crate::Table) is opened rather than on every call.
//!
//! Fields can be declared with the builder methods or with compact textual
//! tags:
//!
//! ```
//! use simplesql_core::{Field, FilterDescription, FilterField, Role, RowDescription};
//!
//! let row = RowDescription::builder()
//!     .field(Field::tagged("id", "id,primary_key").unwrap())
//!     .field(Field::new("version", "version").role(Role::Version))
//!     .field(Field::tagged("name", "name,unique_name").unwrap())
//!     .field(Field::tagged("is_deleted", "is_deleted,soft_delete").unwrap())
//!     .field(Field::tagged("cached_label", "-").unwrap())
//!     .build()
//!     .unwrap();
//! assert_eq!(row.column_names(), vec!["id", "version", "name", "is_deleted"]);
//!
//! let filter = FilterDescription::builder()
//!     .field(FilterField::tagged("state_in", "state:in").unwrap())
//!     .field(FilterField::tagged("limit", "limit").unwrap())
//!     .build()
//!     .unwrap();
//! assert_eq!(filter.fields().len(), 2);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::compile::{EXPECTED_VERSION_PARAM, KEY_PARAM, NAME_PARAM};
use crate::error::Result;
use crate::value::{Record, Value};

/// Reserved filter field that disables the default soft-delete exclusion.
pub const INCLUDE_DELETED: &str = "include_deleted";
/// Reserved filter field that caps the number of returned rows.
pub const LIMIT: &str = "limit";

// Names a predicate field may not take: they are bound by the compiler.
const RESERVED_NAMES: [&str; 5] = [
    LIMIT,
    INCLUDE_DELETED,
    KEY_PARAM,
    NAME_PARAM,
    EXPECTED_VERSION_PARAM,
];

/// Errors raised while building a row or filter description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("more than one version column: {0} and {1}")]
    DuplicateVersion(String, String),

    #[error("more than one soft-delete column: {0} and {1}")]
    DuplicateSoftDelete(String, String),

    #[error("more than one unique-name column: {0} and {1}")]
    DuplicateUniqueName(String, String),

    #[error("column declared twice: {0}")]
    DuplicateColumn(String),

    #[error("row shape has no {0} column")]
    MissingRole(Role),

    #[error("unknown annotation '{annotation}' on field {field}")]
    UnknownAnnotation { field: String, annotation: String },

    #[error("unknown filter operator '{operator}' on field {field}")]
    UnknownOperator { field: String, operator: String },

    #[error("invalid SQL identifier '{0}': must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier(String),

    #[error("field {0} is declared twice")]
    DuplicateField(String),

    #[error("filter field {field} names unknown column {column}")]
    UnknownColumn { field: String, column: String },

    #[error("field {field} is tagged both {first} and {second}")]
    ConflictingRoles {
        field: String,
        first: Role,
        second: Role,
    },

    #[error("filter field name {0} is reserved for generated parameters")]
    ReservedName(String),
}

/// Validates a table, column or parameter name.
///
/// Only ASCII letters, digits and underscores are accepted, and the name
/// must not start with a digit. Identifiers are spliced into SQL text, so
/// anything else is rejected.
pub fn validate_identifier(name: &str) -> std::result::Result<(), TagError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TagError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Special role a column plays in generated statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    Plain,
    /// Identifies the row for point reads and writes. Several columns
    /// carrying this role form a composite key.
    PrimaryKey,
    /// Optimistic-lock counter, incremented by every mutation.
    Version,
    /// Boolean flag marking the row as logically deleted.
    SoftDelete,
    /// Column looked up by `get_by_unique_name`.
    UniqueName,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plain => "plain",
            Self::PrimaryKey => "primary key",
            Self::Version => "version",
            Self::SoftDelete => "soft-delete",
            Self::UniqueName => "unique-name",
        };
        f.write_str(name)
    }
}

/// One field of a row shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    column: Option<String>,
    role: Role,
}

impl Field {
    /// A plain field stored in `column`.
    pub fn new(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: Some(column.into()),
            role: Role::Plain,
        }
    }

    /// A field that lives only in memory and never appears in SQL.
    pub fn memory_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: None,
            role: Role::Plain,
        }
    }

    /// Parses a textual tag: `"<column>[,<annotation>]*"`, or `"-"` for a
    /// memory-only field.
    ///
    /// Recognized annotations are `primary_key`, `version`, `soft_delete`
    /// and `unique_name`; a field takes at most one of them.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::UnknownAnnotation`] for anything else and
    /// [`TagError::ConflictingRoles`] for a second annotation.
    pub fn tagged(name: impl Into<String>, tag: &str) -> std::result::Result<Self, TagError> {
        let name = name.into();
        let mut parts = tag.split(',').map(str::trim);
        let column = parts.next().unwrap_or_default();
        if column.is_empty() || column == "-" {
            return Ok(Self::memory_only(name));
        }

        let mut field = Self::new(name, column);
        for annotation in parts.filter(|p| !p.is_empty()) {
            let role = match annotation {
                "primary_key" => Role::PrimaryKey,
                "version" => Role::Version,
                "soft_delete" => Role::SoftDelete,
                "unique_name" => Role::UniqueName,
                other => {
                    return Err(TagError::UnknownAnnotation {
                        field: field.name.clone(),
                        annotation: other.to_string(),
                    });
                }
            };
            if field.role != Role::Plain {
                return Err(TagError::ConflictingRoles {
                    field: field.name.clone(),
                    first: field.role,
                    second: role,
                });
            }
            field.role = role;
        }
        Ok(field)
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn primary_key(self) -> Self {
        self.role(Role::PrimaryKey)
    }

    pub fn version(self) -> Self {
        self.role(Role::Version)
    }

    pub fn soft_delete(self) -> Self {
        self.role(Role::SoftDelete)
    }

    pub fn unique_name(self) -> Self {
        self.role(Role::UniqueName)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn field_role(&self) -> Role {
        self.role
    }
}

/// Validated, ordered description of a row shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescription {
    fields: Vec<Field>,
}

impl RowDescription {
    pub fn builder() -> RowDescriptionBuilder {
        RowDescriptionBuilder::default()
    }

    /// All declared fields, including memory-only ones.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Fields that map to a column, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&Field, &str)> {
        self.fields
            .iter()
            .filter_map(|f| f.column().map(|c| (f, c)))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns().map(|(_, c)| c).collect()
    }

    /// Column carrying `role`, if the shape declares one.
    pub fn column_for(&self, role: Role) -> Option<&str> {
        self.columns()
            .find(|(f, _)| f.role == role)
            .map(|(_, c)| c)
    }

    /// Primary-key columns in declaration order; more than one for a
    /// composite key.
    pub fn primary_keys(&self) -> Vec<&str> {
        self.columns()
            .filter(|(f, _)| f.role == Role::PrimaryKey)
            .map(|(_, c)| c)
            .collect()
    }

    pub fn version(&self) -> Option<&str> {
        self.column_for(Role::Version)
    }

    pub fn soft_delete(&self) -> Option<&str> {
        self.column_for(Role::SoftDelete)
    }

    pub fn unique_name(&self) -> Option<&str> {
        self.column_for(Role::UniqueName)
    }

    /// Role of `column`, or `None` if the shape has no such column.
    pub fn role_of(&self, column: &str) -> Option<Role> {
        self.columns().find(|(_, c)| *c == column).map(|(f, _)| f.role)
    }

    /// Fails unless the shape declares a column for `role`.
    pub fn require(&self, role: Role) -> std::result::Result<&str, TagError> {
        self.column_for(role).ok_or(TagError::MissingRole(role))
    }
}

/// Builder for [`RowDescription`].
#[derive(Debug, Default)]
pub struct RowDescriptionBuilder {
    fields: Vec<Field>,
}

impl RowDescriptionBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Validates the collected fields.
    ///
    /// # Errors
    ///
    /// Fails on an invalid or repeated column name, or when a role that
    /// admits a single column (version, soft-delete, unique name) is
    /// declared more than once. Any number of columns may share the
    /// primary-key role.
    pub fn build(self) -> std::result::Result<RowDescription, TagError> {
        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        let mut version: Option<&str> = None;
        let mut soft_delete: Option<&str> = None;
        let mut unique_name: Option<&str> = None;

        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(TagError::DuplicateField(field.name.clone()));
            }
            let Some(column) = field.column() else {
                continue;
            };
            validate_identifier(column)?;
            if !columns.insert(column) {
                return Err(TagError::DuplicateColumn(column.to_string()));
            }

            let (slot, duplicate): (_, fn(String, String) -> TagError) = match field.role {
                Role::Plain | Role::PrimaryKey => continue,
                Role::Version => (&mut version, TagError::DuplicateVersion),
                Role::SoftDelete => (&mut soft_delete, TagError::DuplicateSoftDelete),
                Role::UniqueName => (&mut unique_name, TagError::DuplicateUniqueName),
            };
            if let Some(existing) = slot {
                return Err(duplicate(existing.to_string(), column.to_string()));
            }
            *slot = Some(column);
        }

        Ok(RowDescription {
            fields: self.fields,
        })
    }
}

/// Comparison applied by a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    /// SQL comparison token for scalar operators.
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    /// `true` for operators that take a collection.
    pub fn is_collection(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "in" => Ok(Self::In),
            "not_in" => Ok(Self::NotIn),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            other => Err(other.to_string()),
        }
    }
}

/// What a filter field contributes to the WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    /// `column <operator> :field`.
    Predicate { column: String, operator: Operator },
    /// Reserved: when true, soft-deleted rows are eligible.
    IncludeDeleted,
    /// Reserved: appends `LIMIT :limit` when greater than zero.
    Limit,
}

/// One field of a filter shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterField {
    name: String,
    kind: FilterKind,
}

impl FilterField {
    pub fn new(name: impl Into<String>, column: impl Into<String>, operator: Operator) -> Self {
        Self {
            name: name.into(),
            kind: FilterKind::Predicate {
                column: column.into(),
                operator,
            },
        }
    }

    pub fn include_deleted() -> Self {
        Self {
            name: INCLUDE_DELETED.to_string(),
            kind: FilterKind::IncludeDeleted,
        }
    }

    pub fn limit() -> Self {
        Self {
            name: LIMIT.to_string(),
            kind: FilterKind::Limit,
        }
    }

    /// Parses a textual tag: `"<column>:<operator>"`, or one of the
    /// reserved names `include_deleted` and `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::UnknownOperator`] when the operator is missing
    /// or not one of `eq`, `in`, `not_in`, `lt`, `lte`, `gt`, `gte`.
    pub fn tagged(name: impl Into<String>, tag: &str) -> std::result::Result<Self, TagError> {
        let name = name.into();
        match tag.trim() {
            INCLUDE_DELETED => {
                return Ok(Self {
                    name,
                    kind: FilterKind::IncludeDeleted,
                });
            }
            LIMIT => {
                return Ok(Self {
                    name,
                    kind: FilterKind::Limit,
                });
            }
            _ => {}
        }

        let (column, operator) = tag.trim().split_once(':').unwrap_or((tag.trim(), ""));
        let operator = operator
            .parse::<Operator>()
            .map_err(|operator| TagError::UnknownOperator {
                field: name.clone(),
                operator,
            })?;
        Ok(Self::new(name, column, operator))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }
}

/// Validated, ordered description of a filter shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescription {
    fields: Vec<FilterField>,
}

impl FilterDescription {
    pub fn builder() -> FilterDescriptionBuilder {
        FilterDescriptionBuilder::default()
    }

    /// A filter with no fields; lists every live row.
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[FilterField] {
        &self.fields
    }
}

/// Builder for [`FilterDescription`].
#[derive(Debug, Default)]
pub struct FilterDescriptionBuilder {
    fields: Vec<FilterField>,
}

impl FilterDescriptionBuilder {
    pub fn field(mut self, field: FilterField) -> Self {
        self.fields.push(field);
        self
    }

    /// Validates field and column names.
    ///
    /// # Errors
    ///
    /// Fails on invalid identifiers, repeated field names, or a predicate
    /// whose name collides with a generated parameter (`limit`, `key`,
    /// `name`, `expected_version`) or the `include_deleted` switch.
    pub fn build(self) -> std::result::Result<FilterDescription, TagError> {
        let mut names = HashSet::new();
        for field in &self.fields {
            validate_identifier(&field.name)?;
            if !names.insert(field.name.as_str()) {
                return Err(TagError::DuplicateField(field.name.clone()));
            }
            if let FilterKind::Predicate { column, .. } = &field.kind {
                if RESERVED_NAMES.contains(&field.name.as_str()) {
                    return Err(TagError::ReservedName(field.name.clone()));
                }
                validate_identifier(column)?;
            }
        }
        Ok(FilterDescription {
            fields: self.fields,
        })
    }
}

/// Runtime value of one filter field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// The field is unset and contributes nothing.
    Absent,
    Scalar(Value),
    List(Vec<Value>),
}

impl FilterValue {
    /// `Some` becomes a scalar, `None` is absent.
    pub fn optional<T: Into<Value>>(value: Option<T>) -> Self {
        value.map_or(Self::Absent, |v| Self::Scalar(v.into()))
    }

    /// A non-empty collection becomes a list, an empty one is absent.
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            Self::Absent
        } else {
            Self::List(values)
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// A row type that can be stored in a table.
pub trait Row: Sized {
    /// Declares the row's columns and roles.
    fn describe() -> std::result::Result<RowDescription, TagError>;

    /// Value stored in `column`, or `None` if the row has no such column.
    fn column_value(&self, column: &str) -> Option<Value>;

    /// Rebuilds a row from a record selected with the described columns.
    fn from_record(record: &Record) -> Result<Self>;
}

/// A query-parameter type whose present fields become WHERE predicates.
pub trait Filter {
    fn describe() -> std::result::Result<FilterDescription, TagError>;

    /// Runtime value of the field named `field`.
    fn filter_value(&self, field: &str) -> FilterValue;
}

/// Filter shape with no fields, for tables that are only listed in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl Filter for NoFilter {
    fn describe() -> std::result::Result<FilterDescription, TagError> {
        Ok(FilterDescription::empty())
    }

    fn filter_value(&self, _field: &str) -> FilterValue {
        FilterValue::Absent
    }
}

/// Sparse set of column assignments for an update.
pub trait Patch {
    /// Assignments in declaration order; `None` leaves the column untouched.
    fn assignments(&self) -> Vec<(&str, Option<Value>)>;
}

/// A [`Patch`] assembled at runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    assignments: Vec<(String, Option<Value>)>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` to `column`.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((column.into(), Some(value.into())));
        self
    }

    /// Assigns `value` to `column` only when it is `Some`.
    pub fn set_opt<T: Into<Value>>(mut self, column: impl Into<String>, value: Option<T>) -> Self {
        self.assignments.push((column.into(), value.map(Into::into)));
        self
    }
}

impl Patch for Changeset {
    fn assignments(&self) -> Vec<(&str, Option<Value>)> {
        self.assignments
            .iter()
            .map(|(c, v)| (c.as_str(), v.clone()))
            .collect()
    }
}
