//! Read-only catalog queries.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::schema::quote_ident;
use crate::sqlite::SqliteStore;
use crate::statement::{LayoutColumn, TableLayout};
use crate::value::DataType;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseInfo {
    pub path: String,
    pub tables: Vec<TableInfo>,
    pub table_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub row_count: i64,
    /// The stored CREATE TABLE statement.
    pub sql: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    /// 1-based position within the primary key, 0 when not part of it.
    pub primary_key: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    /// `c` for CREATE INDEX, `u` for UNIQUE constraints, `pk` for primary keys.
    pub origin: String,
    pub columns: Vec<String>,
}

impl SqliteStore {
    pub fn database_info(&self) -> Result<DatabaseInfo> {
        let tables = self
            .list_tables()?
            .iter()
            .map(|name| self.table_info(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(DatabaseInfo {
            path: self.path().display().to_string(),
            table_count: tables.len(),
            tables,
        })
    }

    /// User table names, sorted. Internal `sqlite_*` tables are excluded.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn table_info(&self, name: &str) -> Result<TableInfo> {
        let conn = self.conn()?;
        let sql = require_table(conn, name)?;
        debug!(table = name, "reading table catalog");
        Ok(TableInfo {
            name: name.to_string(),
            columns: columns(conn, name)?,
            indexes: indexes(conn, name)?,
            row_count: count_rows(conn, name)?,
            sql,
        })
    }

    /// Number of rows in `name`.
    pub fn table_count(&self, name: &str) -> Result<i64> {
        let conn = self.conn()?;
        require_table(conn, name)?;
        count_rows(conn, name)
    }
}

pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(stored_sql(conn, name)?.is_some())
}

/// Returns the stored CREATE statement, or `NotFound`. Any stored name is
/// accepted; the identifier rules only bind tables created through
/// [`TableSchema`](crate::schema::TableSchema).
fn require_table(conn: &Connection, name: &str) -> Result<Option<String>> {
    stored_sql(conn, name)?
        .ok_or_else(|| StoreError::NotFound(format!("table '{name}' does not exist")))
}

fn stored_sql(conn: &Connection, name: &str) -> Result<Option<Option<String>>> {
    let sql = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(sql)
}

fn count_rows(conn: &Connection, name: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(name));
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

fn columns(conn: &Connection, name: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map(params![name], |row| {
            Ok(ColumnInfo {
                cid: row.get(0)?,
                name: row.get(1)?,
                declared_type: row.get(2)?,
                not_null: row.get(3)?,
                default: row.get(4)?,
                primary_key: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

fn indexes(conn: &Connection, name: &str) -> Result<Vec<IndexInfo>> {
    let mut stmt =
        conn.prepare("SELECT name, \"unique\", origin FROM pragma_index_list(?1) ORDER BY seq")?;
    let listed = stmt
        .query_map(params![name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut columns_stmt =
        conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut indexes = Vec::with_capacity(listed.len());
    for (index, unique, origin) in listed {
        let columns = columns_stmt
            .query_map(params![index], |row| row.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        indexes.push(IndexInfo {
            name: index,
            unique,
            origin,
            columns,
        });
    }
    Ok(indexes)
}

/// Loads the layout the statement compiler validates against.
pub(crate) fn load_layout(conn: &Connection, name: &str) -> Result<TableLayout> {
    require_table(conn, name)?;
    let columns = columns(conn, name)?;
    let pk_count = columns.iter().filter(|c| c.primary_key > 0).count();
    let columns = columns
        .into_iter()
        .map(|c| LayoutColumn {
            data_type: DataType::from_declared(&c.declared_type),
            nullable: !c.not_null,
            has_default: c.default.is_some(),
            rowid_alias: pk_count == 1
                && c.primary_key == 1
                && c.declared_type.eq_ignore_ascii_case("INTEGER"),
            name: c.name,
        })
        .collect();
    Ok(TableLayout {
        table: name.to_string(),
        columns,
    })
}
