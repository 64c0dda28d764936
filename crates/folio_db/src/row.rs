//! Value and row types for dynamic queries.
//!
//! Content tables are created at runtime, so nothing here is typed at compile
//! time: a query produces [`Row`]s of [`SqlValue`]s, and the engine bridges
//! them into JSON objects.

use crate::error::{DbError, Result};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef as _};

/// Value type for query parameters and decoded columns.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Convert a JSON value into a bindable SQL value.
    ///
    /// Booleans bind as integers (SQLite convention); arrays and objects bind
    /// as their serialized JSON text.
    pub fn from_json(value: &JsonValue) -> SqlValue {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Integer(i)
                } else {
                    SqlValue::Real(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }

    /// Convert a decoded SQL value into JSON.
    ///
    /// Blob columns surface as lossy UTF-8 text; content tables are not
    /// expected to carry binary payloads.
    pub fn into_json(self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Integer(v) => JsonValue::Number(Number::from(v)),
            SqlValue::Real(v) => Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::Text(v) => JsonValue::String(v),
            SqlValue::Blob(v) => JsonValue::String(String::from_utf8_lossy(&v).into_owned()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => SqlValue::Null,
        }
    }
}

/// Row data from a query result.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from column names and values (handy in tests).
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Decode a dynamically-typed sqlx row.
    ///
    /// SQLite is dynamically typed, so decoding follows the storage class of
    /// each value rather than the declared column type.
    pub(crate) fn from_sqlite(row: &SqliteRow) -> Result<Self> {
        let count = row.columns().len();
        let mut columns = Vec::with_capacity(count);
        let mut values = Vec::with_capacity(count);

        for column in row.columns() {
            let index = column.ordinal();
            let raw = row.try_get_raw(index)?;
            let value = if raw.is_null() {
                SqlValue::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
                    "REAL" => SqlValue::Real(row.try_get::<f64, _>(index)?),
                    "BLOB" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(index)?),
                    _ => SqlValue::Text(row.try_get::<String, _>(index)?),
                }
            };
            columns.push(column.name().to_string());
            values.push(value);
        }

        Ok(Self { columns, values })
    }

    /// Get a value by column index.
    pub fn get<T: FromSqlValue>(&self, index: usize) -> Result<T> {
        self.values
            .get(index)
            .ok_or_else(|| DbError::conversion(format!("column index {} out of bounds", index)))
            .and_then(T::from_sql_value)
    }

    /// Get a value by column name.
    pub fn get_by_name<T: FromSqlValue>(&self, name: &str) -> Result<T> {
        let index = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DbError::conversion(format!("column '{}' not found", name)))?;
        self.get(index)
    }

    /// Get the raw value for a column name, if present.
    pub fn raw(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    /// Column names in result order.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert the row into a JSON object, one property per column.
    pub fn into_json(self) -> JsonMap<String, JsonValue> {
        let mut map = JsonMap::new();
        for (column, value) in self.columns.into_iter().zip(self.values) {
            map.insert(column, value.into_json());
        }
        map
    }
}

/// Trait for converting from a decoded SQL value.
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: &SqlValue) -> Result<Self>;
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Integer(v) => Ok(*v),
            SqlValue::Null => Err(DbError::conversion(
                "i64 field is NULL - use Option<i64> for nullable columns",
            )),
            _ => Err(DbError::conversion("expected integer")),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Real(v) => Ok(*v),
            SqlValue::Integer(v) => Ok(*v as f64),
            SqlValue::Null => Err(DbError::conversion(
                "f64 field is NULL - use Option<f64> for nullable columns",
            )),
            _ => Err(DbError::conversion("expected real")),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Text(v) => Ok(v.clone()),
            SqlValue::Integer(v) => Ok(v.to_string()),
            SqlValue::Null => Err(DbError::conversion(
                "String field is NULL - use Option<String> for nullable columns",
            )),
            _ => Err(DbError::conversion("expected text")),
        }
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Integer(v) => Ok(*v != 0),
            SqlValue::Null => Err(DbError::conversion(
                "bool field is NULL - use Option<bool> for nullable columns",
            )),
            _ => Err(DbError::conversion("expected boolean")),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Blob(v) => Ok(v.clone()),
            SqlValue::Null => Err(DbError::conversion(
                "Vec<u8> field is NULL - use Option<Vec<u8>> for nullable columns",
            )),
            _ => Err(DbError::conversion("expected blob")),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            _ => T::from_sql_value(value).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_scalars() {
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(true)), SqlValue::Integer(1));
        assert_eq!(SqlValue::from_json(&json!(42)), SqlValue::Integer(42));
        assert_eq!(SqlValue::from_json(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(
            SqlValue::from_json(&json!("hello")),
            SqlValue::Text("hello".to_string())
        );
    }

    #[test]
    fn test_json_compound_values_bind_as_text() {
        assert_eq!(
            SqlValue::from_json(&json!(["a", "b"])),
            SqlValue::Text("[\"a\",\"b\"]".to_string())
        );
    }

    #[test]
    fn test_row_into_json_keeps_columns() {
        let row = Row::new(
            vec!["id".into(), "title".into(), "draft".into()],
            vec![
                SqlValue::Integer(7),
                SqlValue::Text("hello".into()),
                SqlValue::Null,
            ],
        );
        let json = row.into_json();
        assert_eq!(json.get("id"), Some(&json!(7)));
        assert_eq!(json.get("title"), Some(&json!("hello")));
        assert_eq!(json.get("draft"), Some(&json!(null)));
    }

    #[test]
    fn test_typed_getters() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![SqlValue::Integer(3), SqlValue::Text("x".into())],
        );
        let id: i64 = row.get_by_name("id").unwrap();
        assert_eq!(id, 3);
        let name: Option<String> = row.get_by_name("name").unwrap();
        assert_eq!(name.as_deref(), Some("x"));
        assert!(row.get_by_name::<i64>("missing").is_err());
    }
}
