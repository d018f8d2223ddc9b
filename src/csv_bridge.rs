//! CSV export and import of whole tables.
//!
//! Files carry a header row of column names followed by one record per row.
//! NULL is written as an empty field and an empty field reads back as NULL,
//! or as the empty string for NOT NULL text columns.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::info;

use crate::error::{Result, StoreError};
use crate::introspect::load_layout;
use crate::sqlite::SqliteStore;
use crate::statement::Row;
use crate::value::Value;

impl SqliteStore {
    /// Writes every row of `table` to `path` in table column order and
    /// returns the number of rows written.
    pub fn export_csv(&self, table: &str, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let columns: Vec<String> = load_layout(self.conn()?, table)?
            .columns
            .into_iter()
            .map(|c| c.name)
            .collect();
        let rows = self.select(table, None)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let mut writer = csv::Writer::from_path(path).map_err(|e| csv_failure(path, e))?;
        writer
            .write_record(&columns)
            .map_err(|e| csv_failure(path, e))?;
        for row in &rows {
            let record = columns
                .iter()
                .map(|column| row.get(column).map(Value::to_csv_field).unwrap_or_default());
            writer
                .write_record(record)
                .map_err(|e| csv_failure(path, e))?;
        }
        writer.flush().map_err(|e| StoreError::io(path, e))?;

        info!(table, path = %path.display(), rows = rows.len(), "exported csv");
        Ok(rows.len())
    }

    /// Inserts every record of the CSV file at `path` into `table`, all or
    /// nothing. Header names must match column names exactly.
    pub fn import_csv(&mut self, table: &str, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                StoreError::NotFound(format!("csv file '{}' does not exist", path.display()))
            }
            _ => StoreError::io(path, e),
        })?;
        let layout = load_layout(self.conn()?, table)?;

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = reader.headers().map_err(|e| csv_failure(path, e))?.clone();
        if headers.is_empty() {
            return Err(StoreError::Format(format!(
                "{} line 1: missing header row",
                path.display()
            )));
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(headers.len());
        for name in headers.iter() {
            let column = layout
                .columns
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| {
                    StoreError::Schema(format!(
                        "{} line 1: table '{table}' has no column '{name}'",
                        path.display()
                    ))
                })?;
            if !seen.insert(name) {
                return Err(StoreError::Format(format!(
                    "{} line 1: duplicate column '{name}'",
                    path.display()
                )));
            }
            targets.push((name.to_string(), column.data_type, column.nullable));
        }

        let mut rows: Vec<(String, Row)> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_failure(path, e))?;
            let location = format!(
                "{} line {}",
                path.display(),
                record.position().map_or(0, |p| p.line())
            );
            let mut row = Row::with_capacity(targets.len());
            for ((name, ty, nullable), field) in targets.iter().zip(record.iter()) {
                let value = Value::from_csv_field(field, name, *ty, *nullable)
                    .map_err(|e| e.located(&location))?;
                row.insert(name.clone(), value);
            }
            rows.push((location, row));
        }

        let count = self.insert_batch(table, rows.iter().map(|(location, row)| (location.clone(), row)))?;
        info!(table, path = %path.display(), rows = count, "imported csv");
        Ok(count)
    }
}

fn csv_failure(path: &Path, err: csv::Error) -> StoreError {
    if matches!(err.kind(), csv::ErrorKind::Io(_)) {
        return StoreError::io(path, err);
    }
    let location = match err.position() {
        Some(pos) => format!("{} line {}", path.display(), pos.line()),
        None => path.display().to_string(),
    };
    StoreError::Format(format!("{location}: {err}"))
}
