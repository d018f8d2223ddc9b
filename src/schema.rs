//! Declarative table definitions and the DDL generated from them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::value::{DataType, Value};

/// Schema definition for the SQLite database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Each entry is one UNIQUE constraint over one or more columns.
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
    /// Raw boolean expression for a table CHECK constraint. Passed to the
    /// engine verbatim.
    #[serde(default)]
    pub check: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default = "nullable_by_default")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
}

fn nullable_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Literal(Value),
    CurrentTimestamp,
    CurrentDate,
    CurrentTime,
}

impl DefaultValue {
    /// Recognizes the engine's time keywords; anything else is a literal.
    pub fn from_value(value: Value) -> Self {
        if let Value::Text(s) = &value {
            match s.to_ascii_uppercase().as_str() {
                "CURRENT_TIMESTAMP" => return DefaultValue::CurrentTimestamp,
                "CURRENT_DATE" => return DefaultValue::CurrentDate,
                "CURRENT_TIME" => return DefaultValue::CurrentTime,
                _ => {}
            }
        }
        DefaultValue::Literal(value)
    }
}

impl ColumnDefinition {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::from_value(value.into()));
        self
    }

    fn to_sql(&self) -> Result<String> {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.data_type);
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        match &self.default {
            None => {}
            Some(DefaultValue::Literal(value)) => {
                let value = value.clone().coerce(&self.name, self.data_type)?;
                if value.is_null() && !self.nullable {
                    return Err(StoreError::Constraint(format!(
                        "column '{}' is NOT NULL but defaults to NULL",
                        self.name
                    )));
                }
                // Parenthesized so negative numbers and blobs are valid defaults.
                sql.push_str(&format!(" DEFAULT ({})", value.to_sql_literal()));
            }
            Some(DefaultValue::CurrentTimestamp) => sql.push_str(" DEFAULT CURRENT_TIMESTAMP"),
            Some(DefaultValue::CurrentDate) => sql.push_str(" DEFAULT CURRENT_DATE"),
            Some(DefaultValue::CurrentTime) => sql.push_str(" DEFAULT CURRENT_TIME"),
        }
        Ok(sql)
    }
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique: Vec::new(),
            check: None,
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique.push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn check(mut self, expression: &str) -> Self {
        self.check = Some(expression.to_string());
        self
    }

    /// Validates identifiers, column uniqueness and constraint references.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        if self.columns.is_empty() {
            return Err(StoreError::Schema(format!(
                "table '{}' must have at least one column",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            validate_identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(StoreError::Schema(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, self.name
                )));
            }
        }
        let constrained = self.primary_key.iter().chain(self.unique.iter().flatten());
        for name in constrained {
            if !seen.contains(name.as_str()) {
                return Err(StoreError::Schema(format!(
                    "constraint references unknown column '{name}' in table '{}'",
                    self.name
                )));
            }
        }
        if self.unique.iter().any(Vec::is_empty) {
            return Err(StoreError::Schema(format!(
                "empty unique constraint in table '{}'",
                self.name
            )));
        }
        if let Some(check) = &self.check {
            if check.trim().is_empty() {
                return Err(StoreError::Validation(format!(
                    "check constraint of table '{}' is empty",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Builds the CREATE TABLE statement. `if_not_exists` is used only for
    /// the bootstrap schema applied on open.
    pub fn create_sql(&self, if_not_exists: bool) -> Result<String> {
        self.validate()?;
        let mut parts = self
            .columns
            .iter()
            .map(ColumnDefinition::to_sql)
            .collect::<Result<Vec<_>>>()?;
        if !self.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", quote_list(&self.primary_key)));
        }
        for columns in &self.unique {
            parts.push(format!("UNIQUE ({})", quote_list(columns)));
        }
        if let Some(check) = &self.check {
            parts.push(format!("CHECK ({check})"));
        }
        Ok(format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_ident(&self.name),
            parts.join(", ")
        ))
    }
}

pub fn drop_sql(name: &str) -> String {
    format!("DROP TABLE {}", quote_ident(name))
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, excluding the engine's reserved
/// `sqlite_` prefix.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let legal_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !legal_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::Schema(format!("'{name}' is not a legal identifier")));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(StoreError::Schema(format!("'{name}' uses the reserved sqlite_ prefix")));
    }
    Ok(())
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}
