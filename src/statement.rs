//! Compilation of INSERT / SELECT / UPDATE / DELETE statement text.
//!
//! Statements are parameterless: values are rendered as literals through
//! [`Value::coerce`] and [`Value::to_sql_literal`], identifiers are validated
//! and quoted.
//!
//! # Condition fragments
//!
//! WHERE conditions are caller-supplied expression text and are appended
//! **verbatim**. They are not parsed, rewritten or escaped here; the only
//! check is that update and delete receive a non-blank one. This is the one
//! place where caller input reaches the engine unvalidated, and hosts that
//! forward untrusted conditions must account for it.

use indexmap::IndexMap;

use crate::error::{Result, StoreError};
use crate::schema::quote_ident;
use crate::value::{DataType, Value};

/// One row: column name to value, in table column order when read back.
pub type Row = IndexMap<String, Value>;

/// Column metadata read from the live table, used to validate statements.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayoutColumn {
    pub name: String,
    /// `None` for columns without a recognizable declared type.
    pub data_type: Option<DataType>,
    pub nullable: bool,
    pub has_default: bool,
    /// Single-column INTEGER primary key: assigned by the engine when omitted.
    pub rowid_alias: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableLayout {
    pub table: String,
    pub columns: Vec<LayoutColumn>,
}

impl TableLayout {
    fn column(&self, name: &str) -> Result<&LayoutColumn> {
        self.columns.iter().find(|c| c.name == name).ok_or_else(|| {
            StoreError::Schema(format!("table '{}' has no column '{name}'", self.table))
        })
    }

    /// Type hints for a result set with the given column names.
    pub fn hints<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<Option<DataType>> {
        names
            .into_iter()
            .map(|name| {
                self.columns
                    .iter()
                    .find(|c| c.name == name)
                    .and_then(|c| c.data_type)
            })
            .collect()
    }

    fn literal(&self, column: &LayoutColumn, value: &Value) -> Result<String> {
        let value = match column.data_type {
            Some(ty) => value.clone().coerce(&column.name, ty)?,
            None => value.clone(),
        };
        if value.is_null() && !column.nullable && !column.rowid_alias {
            return Err(StoreError::Constraint(format!(
                "column '{}.{}' is NOT NULL",
                self.table, column.name
            )));
        }
        Ok(value.to_sql_literal())
    }

    fn check_known(&self, row: &Row) -> Result<()> {
        for name in row.keys() {
            self.column(name)?;
        }
        Ok(())
    }

    pub fn compile_insert(&self, row: &Row) -> Result<String> {
        self.check_known(row)?;
        let mut names = Vec::new();
        let mut literals = Vec::new();
        for column in &self.columns {
            match row.get(&column.name) {
                Some(value) => {
                    literals.push(self.literal(column, value)?);
                    names.push(quote_ident(&column.name));
                }
                None if !column.nullable && !column.has_default && !column.rowid_alias => {
                    return Err(StoreError::Constraint(format!(
                        "missing value for NOT NULL column '{}.{}' without default",
                        self.table, column.name
                    )));
                }
                None => {}
            }
        }
        if names.is_empty() {
            return Ok(format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&self.table)));
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            names.join(", "),
            literals.join(", ")
        ))
    }

    /// A blank condition selects every row.
    pub fn compile_select(&self, condition: Option<&str>) -> String {
        let mut sql = format!("SELECT * FROM {}", quote_ident(&self.table));
        if let Some(condition) = condition.filter(|c| !c.trim().is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }
        sql
    }

    pub fn compile_update(&self, assignments: &Row, condition: Option<&str>) -> Result<String> {
        let condition = require_condition(condition, "update", &self.table)?;
        if assignments.is_empty() {
            return Err(StoreError::Validation(format!(
                "update of '{}' has no assignments",
                self.table
            )));
        }
        self.check_known(assignments)?;
        let mut sets = Vec::with_capacity(assignments.len());
        for column in &self.columns {
            if let Some(value) = assignments.get(&column.name) {
                sets.push(format!(
                    "{} = {}",
                    quote_ident(&column.name),
                    self.literal(column, value)?
                ));
            }
        }
        Ok(format!(
            "UPDATE {} SET {} WHERE {condition}",
            quote_ident(&self.table),
            sets.join(", ")
        ))
    }

    pub fn compile_delete(&self, condition: Option<&str>) -> Result<String> {
        let condition = require_condition(condition, "delete", &self.table)?;
        Ok(format!("DELETE FROM {} WHERE {condition}", quote_ident(&self.table)))
    }
}

/// Update and delete never run without a condition.
pub(crate) fn require_condition<'a>(condition: Option<&'a str>, op: &str, table: &str) -> Result<&'a str> {
    match condition {
        Some(c) if !c.trim().is_empty() => Ok(c),
        _ => Err(StoreError::Validation(format!(
            "{op} on '{table}' requires a non-empty condition"
        ))),
    }
}
