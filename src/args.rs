//! Decoding of loosely-typed JSON arguments into typed store inputs.
//!
//! A tool-invocation host hands over rows, column descriptors and
//! constraint lists as JSON. These helpers turn them into [`Row`],
//! [`ColumnDefinition`] and [`TableSchema`] values, classifying shape
//! problems as `Validation` and unknown types as `Schema`.

use serde_json::{Map, Value as Json};

use crate::error::{Result, StoreError};
use crate::schema::{ColumnDefinition, DefaultValue, TableSchema};
use crate::statement::Row;
use crate::value::{DataType, Value};

pub fn value_from_json(json: &Json) -> Result<Value> {
    let value = match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().ok_or_else(|| {
                StoreError::Validation(format!("number {n} is out of range"))
            })?),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(_) | Json::Object(_) => {
            return Err(StoreError::Validation(format!(
                "expected a scalar value, got {json}"
            )))
        }
    };
    Ok(value)
}

pub fn row_from_json(json: &Json) -> Result<Row> {
    let object = as_object(json, "row")?;
    object
        .iter()
        .map(|(column, value)| {
            value_from_json(value)
                .map(|v| (column.clone(), v))
                .map_err(|e| e.located(format!("column '{column}'")))
        })
        .collect()
}

pub fn rows_from_json(json: &Json) -> Result<Vec<Row>> {
    let Json::Array(items) = json else {
        return Err(StoreError::Validation("rows must be a list of objects".to_string()));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| row_from_json(item).map_err(|e| e.located(format!("row {}", i + 1))))
        .collect()
}

/// Accepts `{name, type, nullable | not_null, default}`.
pub fn column_from_json(json: &Json) -> Result<ColumnDefinition> {
    let object = as_object(json, "column descriptor")?;
    let name = object
        .get("name")
        .and_then(Json::as_str)
        .ok_or_else(|| StoreError::Validation("column descriptor needs a string 'name'".to_string()))?;
    let data_type: DataType = object
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| StoreError::Validation(format!("column '{name}' needs a string 'type'")))?
        .parse()
        .map_err(|e: StoreError| e.located(format!("column '{name}'")))?;

    let nullable = match (flag(object, "nullable")?, flag(object, "not_null")?) {
        (Some(nullable), None) => nullable,
        (None, Some(not_null)) => !not_null,
        (None, None) => true,
        (Some(nullable), Some(not_null)) if nullable != not_null => nullable,
        (Some(_), Some(_)) => {
            return Err(StoreError::Validation(format!(
                "column '{name}' has contradictory 'nullable' and 'not_null'"
            )))
        }
    };
    let default = match object.get("default") {
        None => None,
        Some(json) => Some(DefaultValue::from_value(value_from_json(json)?)),
    };

    Ok(ColumnDefinition {
        name: name.to_string(),
        data_type,
        nullable,
        default,
    })
}

/// A single column name or a list of them.
pub fn names_from_json(json: &Json) -> Result<Vec<String>> {
    match json {
        Json::Null => Ok(Vec::new()),
        Json::String(s) => Ok(vec![s.clone()]),
        Json::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    StoreError::Validation(format!("expected a column name, got {item}"))
                })
            })
            .collect(),
        other => Err(StoreError::Validation(format!(
            "expected a column name or list of names, got {other}"
        ))),
    }
}

/// A list of names (one constraint each) or a list of name lists.
pub fn unique_from_json(json: &Json) -> Result<Vec<Vec<String>>> {
    match json {
        Json::Null => Ok(Vec::new()),
        Json::String(s) => Ok(vec![vec![s.clone()]]),
        Json::Array(items) => items
            .iter()
            .map(|item| match item {
                Json::String(s) => Ok(vec![s.clone()]),
                _ => names_from_json(item),
            })
            .collect(),
        other => Err(StoreError::Validation(format!(
            "expected a list of unique constraints, got {other}"
        ))),
    }
}

/// Assembles a table definition from the arguments of a create-table call.
pub fn table_from_json(
    name: &str,
    columns: &Json,
    primary_key: Option<&Json>,
    unique: Option<&Json>,
    check: Option<&str>,
) -> Result<TableSchema> {
    let Json::Array(descriptors) = columns else {
        return Err(StoreError::Validation(format!(
            "columns of '{name}' must be a list of descriptors"
        )));
    };
    Ok(TableSchema {
        name: name.to_string(),
        columns: descriptors
            .iter()
            .map(column_from_json)
            .collect::<Result<Vec<_>>>()?,
        primary_key: primary_key.map(names_from_json).transpose()?.unwrap_or_default(),
        unique: unique.map(unique_from_json).transpose()?.unwrap_or_default(),
        check: check.map(str::to_string),
    })
}

fn as_object<'a>(json: &'a Json, what: &str) -> Result<&'a Map<String, Json>> {
    json.as_object()
        .ok_or_else(|| StoreError::Validation(format!("{what} must be an object, got {json}")))
}

fn flag(object: &Map<String, Json>, key: &str) -> Result<Option<bool>> {
    match object.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(StoreError::Validation(format!(
            "'{key}' must be a boolean, got {other}"
        ))),
    }
}
