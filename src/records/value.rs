// ABOUTME: Owned column values that bind as PostgreSQL parameters
// ABOUTME: Keeps insert parameters inspectable while delegating encoding to tokio-postgres

use super::ColumnKind;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_postgres::types::ToSql;
use uuid::Uuid;

/// A single column value of a record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Uuid(Uuid),
    Text(Option<String>),
    Float(Option<f64>),
    Date(Option<NaiveDate>),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn kind(&self) -> ColumnKind {
        match self {
            FieldValue::Uuid(_) => ColumnKind::Uuid,
            FieldValue::Text(_) => ColumnKind::Text,
            FieldValue::Float(_) => ColumnKind::Float,
            FieldValue::Date(_) => ColumnKind::Date,
            FieldValue::Timestamp(_) => ColumnKind::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            FieldValue::Text(None) | FieldValue::Float(None) | FieldValue::Date(None)
        )
    }

    /// Borrow the inner value as a query parameter
    ///
    /// tokio-postgres checks the concrete Rust type against the column type
    /// the server reports, so a uuid never lands in a text column by accident.
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            FieldValue::Uuid(v) => v,
            FieldValue::Text(v) => v,
            FieldValue::Float(v) => v,
            FieldValue::Date(v) => v,
            FieldValue::Timestamp(v) => v,
        }
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(Some(value))
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        FieldValue::Float(value)
    }
}

impl From<Option<NaiveDate>> for FieldValue {
    fn from(value: Option<NaiveDate>) -> Self {
        FieldValue::Date(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}
