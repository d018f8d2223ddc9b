//! Values, logical column types and the coercion/escaping rules between them.
//!
//! Every value that ends up inside generated statement text passes through
//! [`Value::coerce`] and [`Value::to_sql_literal`]. Nothing else in the crate
//! formats caller data into SQL.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

/// Logical column types accepted by the schema builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Integer,
    Text,
    Real,
    Blob,
    Boolean,
    Date,
    Time,
    DateTime,
    Timestamp,
}

impl DataType {
    pub fn as_sql(self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Text => "TEXT",
            DataType::Real => "REAL",
            DataType::Blob => "BLOB",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
            DataType::Time => "TIME",
            DataType::DateTime => "DATETIME",
            DataType::Timestamp => "TIMESTAMP",
        }
    }

    /// Best-effort mapping of a declared type found in an existing table,
    /// following SQLite's affinity rules. Returns `None` when the declaration
    /// carries no usable type (untyped columns accept anything).
    pub fn from_declared(decl: &str) -> Option<DataType> {
        if let Ok(exact) = decl.parse() {
            return Some(exact);
        }
        let upper = decl.to_ascii_uppercase();
        if upper.contains("INT") {
            Some(DataType::Integer)
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Some(DataType::Text)
        } else if upper.contains("BLOB") {
            Some(DataType::Blob)
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Some(DataType::Real)
        } else if upper.contains("BOOL") {
            Some(DataType::Boolean)
        } else {
            None
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for DataType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s.trim().to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" => DataType::Integer,
            "TEXT" | "VARCHAR" | "STRING" => DataType::Text,
            "REAL" | "FLOAT" | "DOUBLE" => DataType::Real,
            "BLOB" => DataType::Blob,
            "BOOLEAN" | "BOOL" => DataType::Boolean,
            "DATE" => DataType::Date,
            "TIME" => DataType::Time,
            "DATETIME" => DataType::DateTime,
            "TIMESTAMP" => DataType::Timestamp,
            _ => return Err(StoreError::Schema(format!("unsupported column type '{s}'"))),
        };
        Ok(ty)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
            Value::Boolean(_) => "BOOLEAN",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Checks this value against the declared type of `column` and returns
    /// the normalized form to store. NULL passes through; nullability is the
    /// statement compiler's concern.
    pub fn coerce(self, column: &str, ty: DataType) -> Result<Value> {
        let mismatch = |value: &Value| {
            StoreError::TypeMismatch(format!(
                "column '{column}' expects {ty}, got {}",
                value.type_name()
            ))
        };
        let coerced = match (ty, self) {
            (_, Value::Null) => Value::Null,
            (_, Value::Real(r)) if !r.is_finite() => {
                return Err(StoreError::TypeMismatch(format!(
                    "column '{column}' cannot store non-finite value {r}"
                )))
            }
            (DataType::Integer, v @ Value::Integer(_)) => v,
            (DataType::Integer, Value::Boolean(b)) => Value::Integer(i64::from(b)),
            (DataType::Real, Value::Integer(i)) => Value::Real(i as f64),
            (DataType::Real, v @ Value::Real(_)) => v,
            (DataType::Text, v @ Value::Text(_)) => v,
            (DataType::Blob, v @ Value::Blob(_)) => v,
            (DataType::Boolean, v @ Value::Boolean(_)) => v,
            (DataType::Boolean, Value::Integer(i @ (0 | 1))) => Value::Boolean(i == 1),
            (DataType::Date, Value::Text(s)) => {
                check_temporal(column, ty, &s, |s| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                })?;
                Value::Text(s)
            }
            (DataType::Time, Value::Text(s)) => {
                check_temporal(column, ty, &s, |s| {
                    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").is_ok()
                        || NaiveTime::parse_from_str(s, "%H:%M").is_ok()
                })?;
                Value::Text(s)
            }
            (DataType::DateTime | DataType::Timestamp, Value::Text(s)) => {
                check_temporal(column, ty, &s, is_datetime)?;
                Value::Text(s)
            }
            (DataType::DateTime | DataType::Timestamp, v @ Value::Integer(_)) => v,
            (_, other) => return Err(mismatch(&other)),
        };
        Ok(coerced)
    }

    /// Renders the value as a literal that is safe to splice into statement
    /// text. Text can never terminate its own literal early.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            // Debug keeps a decimal point or exponent so the engine sees a real.
            Value::Real(r) => format!("{r:?}"),
            Value::Boolean(b) => i64::from(*b).to_string(),
            Value::Text(s) if s.contains('\0') => {
                format!("CAST(X'{}' AS TEXT)", hex::encode(s.as_bytes()))
            }
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Blob(b) => format!("X'{}'", hex::encode(b)),
        }
    }

    /// Reads an engine value, restoring booleans for BOOLEAN columns.
    pub(crate) fn from_engine(raw: ValueRef<'_>, hint: Option<DataType>) -> Value {
        match (raw, hint) {
            (ValueRef::Integer(i @ (0 | 1)), Some(DataType::Boolean)) => Value::Boolean(i == 1),
            (ValueRef::Null, _) => Value::Null,
            (ValueRef::Integer(i), _) => Value::Integer(i),
            (ValueRef::Real(r), _) => Value::Real(r),
            (ValueRef::Text(t), _) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            (ValueRef::Blob(b), _) => Value::Blob(b.to_vec()),
        }
    }

    /// Canonical text form used for CSV fields. NULL is the empty field.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Text(s) => s.clone(),
            Value::Blob(b) => hex::encode(b),
        }
    }

    /// Parses a CSV field for a column of type `ty` (`None` when the column is
    /// untyped) and coerces it.
    ///
    /// An empty field is NULL, except for NOT NULL text and untyped columns,
    /// where it is the empty string.
    pub fn from_csv_field(
        field: &str,
        column: &str,
        ty: Option<DataType>,
        nullable: bool,
    ) -> Result<Value> {
        if field.is_empty() {
            return Ok(match ty {
                None | Some(DataType::Text) if !nullable => Value::Text(String::new()),
                _ => Value::Null,
            });
        }
        let unparsable = |ty: DataType| {
            StoreError::TypeMismatch(format!(
                "column '{column}' expects {ty}, got unparsable text '{field}'"
            ))
        };
        let Some(ty) = ty else {
            return Ok(guess_field(field));
        };
        let parsed = match ty {
            DataType::Integer => Value::Integer(field.parse().map_err(|_| unparsable(ty))?),
            DataType::Real => Value::Real(field.parse().map_err(|_| unparsable(ty))?),
            DataType::Boolean => match field.to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Boolean(true),
                "false" | "0" => Value::Boolean(false),
                _ => return Err(unparsable(ty)),
            },
            DataType::Blob => Value::Blob(hex::decode(field).map_err(|_| unparsable(ty))?),
            DataType::DateTime | DataType::Timestamp => match field.parse::<i64>() {
                Ok(epoch) => Value::Integer(epoch),
                Err(_) => Value::Text(field.to_string()),
            },
            DataType::Text | DataType::Date | DataType::Time => Value::Text(field.to_string()),
        };
        parsed.coerce(column, ty)
    }
}

fn guess_field(field: &str) -> Value {
    if let Ok(i) = field.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(r) = field.parse::<f64>() {
        Value::Real(r)
    } else {
        Value::Text(field.to_string())
    }
}

fn is_datetime(s: &str) -> bool {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    FORMATS
        .iter()
        .any(|fmt| NaiveDateTime::parse_from_str(s, fmt).is_ok())
        || DateTime::parse_from_rfc3339(s).is_ok()
}

fn check_temporal(column: &str, ty: DataType, s: &str, valid: impl Fn(&str) -> bool) -> Result<()> {
    if valid(s) {
        Ok(())
    } else {
        Err(StoreError::TypeMismatch(format!(
            "column '{column}' expects {ty}, got text '{s}'"
        )))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_literals_cannot_escape_their_quotes() {
        let v = Value::from("x'); DROP TABLE users; --");
        assert_eq!(v.to_sql_literal(), "'x''); DROP TABLE users; --'");
        assert_eq!(Value::from("a\0b").to_sql_literal(), "CAST(X'610062' AS TEXT)");
    }

    #[test]
    fn native_literals() {
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
        assert_eq!(Value::Integer(-7).to_sql_literal(), "-7");
        assert_eq!(Value::Real(1.0).to_sql_literal(), "1.0");
        assert_eq!(Value::Boolean(true).to_sql_literal(), "1");
        assert_eq!(Value::Blob(vec![0xde, 0xad]).to_sql_literal(), "X'dead'");
    }

    #[test]
    fn coercion_widens_and_rejects() {
        assert_eq!(Value::Integer(3).coerce("r", DataType::Real).unwrap(), Value::Real(3.0));
        assert_eq!(Value::Integer(1).coerce("b", DataType::Boolean).unwrap(), Value::Boolean(true));
        assert_eq!(Value::Null.coerce("n", DataType::Integer).unwrap(), Value::Null);

        let err = Value::from("25").coerce("age", DataType::Integer).unwrap_err();
        assert_eq!(
            err,
            StoreError::TypeMismatch("column 'age' expects INTEGER, got TEXT".into())
        );
        assert!(Value::Real(f64::NAN).coerce("r", DataType::Real).is_err());
        assert!(Value::Integer(2).coerce("b", DataType::Boolean).is_err());
    }

    #[test]
    fn temporal_text_is_validated() {
        assert!(Value::from("2024-02-29").coerce("d", DataType::Date).is_ok());
        assert!(Value::from("2023-02-29").coerce("d", DataType::Date).is_err());
        assert!(Value::from("12:30:01.5").coerce("t", DataType::Time).is_ok());
        assert!(Value::from("2024-01-02T03:04:05Z").coerce("ts", DataType::Timestamp).is_ok());
        assert!(Value::from("2024-01-02 03:04:05").coerce("dt", DataType::DateTime).is_ok());
        assert!(Value::Integer(1_700_000_000).coerce("ts", DataType::Timestamp).is_ok());
        assert!(Value::from("yesterday").coerce("dt", DataType::DateTime).is_err());
    }

    #[test]
    fn type_names_parse_case_insensitively() {
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Integer);
        assert_eq!("Bool".parse::<DataType>().unwrap(), DataType::Boolean);
        assert!(matches!("JSONB".parse::<DataType>(), Err(StoreError::Schema(_))));
        assert_eq!(DataType::from_declared("VARCHAR(20)"), Some(DataType::Text));
        assert_eq!(DataType::from_declared(""), None);
    }

    #[test]
    fn csv_fields_round_trip() {
        for (value, ty) in [
            (Value::Integer(42), DataType::Integer),
            (Value::Real(0.1), DataType::Real),
            (Value::Boolean(false), DataType::Boolean),
            (Value::from("a, \"quoted\" b"), DataType::Text),
            (Value::Blob(vec![1, 2, 255]), DataType::Blob),
            (Value::Null, DataType::Text),
        ] {
            let field = value.to_csv_field();
            assert_eq!(Value::from_csv_field(&field, "c", Some(ty), true).unwrap(), value);
        }
        assert_eq!(
            Value::from_csv_field("", "title", Some(DataType::Text), false).unwrap(),
            Value::from("")
        );
        assert_eq!(
            Value::from_csv_field("", "note", None, false).unwrap(),
            Value::from("")
        );
        assert_eq!(
            Value::from_csv_field("", "qty", Some(DataType::Integer), false).unwrap(),
            Value::Null
        );
        assert!(matches!(
            Value::from_csv_field("abc", "age", Some(DataType::Integer), true),
            Err(StoreError::TypeMismatch(m)) if m.contains("age")
        ));
    }
}
