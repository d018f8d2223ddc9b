//! The execution gateway: sole owner of the database connection.
//!
//! Every file-touching operation in the crate goes through a [`SqliteStore`].
//! Structured operations run inside a transaction that commits on success and
//! rolls back on any error; engine failures are classified into
//! [`StoreError`] before they leave this module.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, Statement};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::introspect::{load_layout, table_exists};
use crate::schema::{drop_sql, Schema, TableSchema};
use crate::statement::{require_condition, Row};
use crate::value::{DataType, Value};

/// Result of a raw statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecOutcome {
    Rows(Vec<Row>),
    Affected(usize),
}

/// Handle to one open database file.
///
/// The handle is a plain owned value: operations that touch the file outside
/// the statement path (backup, restore) take `&mut self`, so nothing else can
/// run against the same handle while they do.
#[derive(Debug)]
pub struct SqliteStore {
    config: StoreConfig,
    connection: Option<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database described by `config` and
    /// applies its bootstrap schema.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let connection = open_connection(&config)?;
        let mut store = Self {
            config,
            connection: Some(connection),
        };
        store.initialize_schema()?;
        info!(path = %store.path().display(), "opened sqlite store");
        Ok(store)
    }

    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(StoreConfig::new(path, Schema::new()))
    }

    /// Creates `<name>.db` in `dir` (or the working directory) and checks the
    /// file answers a trivial query.
    pub fn create_database(name: &str, dir: Option<&Path>) -> Result<Self> {
        let store = Self::open(StoreConfig::for_database(name, dir)?)?;
        store.conn()?.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.config.db_path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Flushes any pending transaction and closes the file.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    pub(crate) fn conn(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(StoreError::Closed)
    }

    /// Commits anything pending so the file on disk is complete.
    pub(crate) fn flush(&self) -> Result<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            warn!(path = %self.path().display(), "committing pending transaction");
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Closes the connection, leaving the handle closed until `reacquire`.
    pub(crate) fn release(&mut self) -> Result<()> {
        if self.connection.is_none() {
            return Ok(());
        }
        self.flush()?;
        if let Some(conn) = self.connection.take() {
            conn.close().map_err(|(_, err)| StoreError::from(err))?;
            info!(path = %self.path().display(), "closed sqlite store");
        }
        Ok(())
    }

    pub(crate) fn reacquire(&mut self) -> Result<()> {
        if self.connection.is_none() {
            self.connection = Some(open_connection(&self.config)?);
        }
        Ok(())
    }

    fn initialize_schema(&mut self) -> Result<()> {
        if self.config.schema.tables.is_empty() {
            return Ok(());
        }
        let statements = self
            .config
            .schema
            .tables
            .iter()
            .map(|table| table.create_sql(true))
            .collect::<Result<Vec<_>>>()?;
        self.in_transaction("initialize_schema", |tx| {
            for sql in &statements {
                debug!(%sql, "applying bootstrap schema");
                tx.execute_batch(sql)?;
            }
            Ok(())
        })
    }

    /// Runs `body` inside a savepoint. At the top level this is an ordinary
    /// transaction; under a transaction opened by a raw `BEGIN` it nests, and
    /// the work becomes durable when that transaction commits.
    fn in_transaction<T>(
        &mut self,
        operation: &str,
        body: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let conn = self.connection.as_mut().ok_or(StoreError::Closed)?;
        let savepoint = conn.savepoint()?;
        match body(&savepoint) {
            Ok(value) => {
                savepoint.commit()?;
                Ok(value)
            }
            Err(err) => {
                warn!(operation, error = %err, "rolling back");
                // the default drop behavior rolls back to and releases the savepoint
                if let Err(rollback) = savepoint.finish() {
                    warn!(operation, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Runs one raw statement. Queries return rows, everything else the
    /// number of affected rows.
    ///
    /// No coercion or validation happens beyond what the engine does itself;
    /// prefer the structured operations. Mutating statements are committed on
    /// success, and any failure rolls back an open transaction.
    pub fn execute(&mut self, sql: &str) -> Result<ExecOutcome> {
        if sql.trim().is_empty() {
            return Err(StoreError::Validation("sql statement is empty".to_string()));
        }
        let conn = self.conn()?;
        debug!(%sql, "executing raw statement");
        match run_raw(conn, sql) {
            Ok((outcome, readonly)) => {
                if !readonly && !conn.is_autocommit() {
                    conn.execute_batch("COMMIT")?;
                }
                Ok(outcome)
            }
            Err(err) => {
                if !conn.is_autocommit() {
                    warn!(error = %err, "raw statement failed, rolling back");
                    conn.execute_batch("ROLLBACK")?;
                }
                Err(err)
            }
        }
    }

    /// Creates `table`; fails without side effects if it already exists or
    /// its definition is invalid.
    pub fn create_table(&mut self, table: &TableSchema) -> Result<()> {
        let sql = table.create_sql(false)?;
        self.in_transaction("create_table", |tx| {
            if table_exists(tx, &table.name)? {
                return Err(StoreError::Schema(format!(
                    "table '{}' already exists",
                    table.name
                )));
            }
            debug!(%sql, "compiled statement");
            tx.execute_batch(&sql)?;
            Ok(())
        })?;
        info!(table = %table.name, columns = table.columns.len(), "created table");
        Ok(())
    }

    /// Drops `name`. A missing table is `NotFound` unless `if_exists` is set,
    /// in which case `Ok(false)` is returned.
    pub fn drop_table(&mut self, name: &str, if_exists: bool) -> Result<bool> {
        let sql = drop_sql(name);
        let dropped = self.in_transaction("drop_table", |tx| {
            if !table_exists(tx, name)? {
                return if if_exists {
                    Ok(false)
                } else {
                    Err(StoreError::NotFound(format!("table '{name}' does not exist")))
                };
            }
            debug!(%sql, "compiled statement");
            tx.execute_batch(&sql)?;
            Ok(true)
        })?;
        if dropped {
            info!(table = name, "dropped table");
        }
        Ok(dropped)
    }

    /// Inserts one row and returns its row id.
    pub fn insert(&mut self, table: &str, row: &Row) -> Result<i64> {
        self.in_transaction("insert", |tx| {
            let sql = load_layout(tx, table)?.compile_insert(row)?;
            debug!(%sql, "compiled statement");
            tx.execute(&sql, [])?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Inserts all rows or none. The first failing row is named in the error
    /// as `row N` (1-based).
    pub fn insert_many(&mut self, table: &str, rows: &[Row]) -> Result<usize> {
        let located = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (format!("row {}", i + 1), row));
        self.insert_batch(table, located)
    }

    /// All-or-nothing batch insert. Every row is compiled before the first
    /// one is written.
    pub(crate) fn insert_batch<'r>(
        &mut self,
        table: &str,
        rows: impl IntoIterator<Item = (String, &'r Row)>,
    ) -> Result<usize> {
        let count = self.in_transaction("insert_many", |tx| {
            let layout = load_layout(tx, table)?;
            let mut compiled = Vec::new();
            for (location, row) in rows {
                match layout.compile_insert(row) {
                    Ok(sql) => compiled.push((location, sql)),
                    Err(err) => return Err(err.located(location)),
                }
            }
            for (location, sql) in &compiled {
                tx.execute(sql, [])
                    .map_err(|err| StoreError::from(err).located(location))?;
            }
            Ok(compiled.len())
        })?;
        info!(table, count, "inserted rows");
        Ok(count)
    }

    /// Rows of `table` in storage order, filtered by `condition` when given.
    /// The condition is passed to the engine verbatim.
    pub fn select(&self, table: &str, condition: Option<&str>) -> Result<Vec<Row>> {
        let conn = self.conn()?;
        let layout = load_layout(conn, table)?;
        let sql = layout.compile_select(condition);
        debug!(%sql, "compiled statement");
        let mut stmt = conn.prepare(&sql)?;
        let hints = layout.hints(stmt.column_names());
        collect_rows(&mut stmt, &hints)
    }

    /// Applies `assignments` to rows matching `condition`, which is required.
    pub fn update(&mut self, table: &str, assignments: &Row, condition: Option<&str>) -> Result<usize> {
        require_condition(condition, "update", table)?;
        self.in_transaction("update", |tx| {
            let sql = load_layout(tx, table)?.compile_update(assignments, condition)?;
            debug!(%sql, "compiled statement");
            Ok(tx.execute(&sql, [])?)
        })
    }

    /// Deletes rows matching `condition`, which is required.
    pub fn delete(&mut self, table: &str, condition: Option<&str>) -> Result<usize> {
        require_condition(condition, "delete", table)?;
        self.in_transaction("delete", |tx| {
            let sql = load_layout(tx, table)?.compile_delete(condition)?;
            debug!(%sql, "compiled statement");
            Ok(tx.execute(&sql, [])?)
        })
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(path = %self.path().display(), error = %err, "sqlite store not closed cleanly");
        }
    }
}

fn open_connection(config: &StoreConfig) -> Result<Connection> {
    let path = &config.db_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let conn = Connection::open(path).map_err(|e| StoreError::io(path, e))?;
    if let Some(timeout) = config.busy_timeout {
        conn.busy_timeout(timeout)?;
    }
    Ok(conn)
}

fn run_raw(conn: &Connection, sql: &str) -> Result<(ExecOutcome, bool)> {
    let mut stmt = conn.prepare(sql)?;
    let readonly = stmt.readonly();
    if stmt.column_count() == 0 {
        let affected = stmt.execute([])?;
        return Ok((ExecOutcome::Affected(affected), readonly));
    }
    let hints = stmt
        .columns()
        .iter()
        .map(|c| c.decl_type().and_then(DataType::from_declared))
        .collect::<Vec<_>>();
    let rows = collect_rows(&mut stmt, &hints)?;
    Ok((ExecOutcome::Rows(rows), readonly))
}

pub(crate) fn collect_rows(stmt: &mut Statement<'_>, hints: &[Option<DataType>]) -> Result<Vec<Row>> {
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let hint = hints.get(i).copied().flatten();
            record.insert(name.clone(), Value::from_engine(row.get_ref(i)?, hint));
        }
        records.push(record);
    }
    Ok(records)
}
