//! Management layer for a single embedded SQLite database file.
//!
//! # Intention
//!
//! - Turn declarative table descriptions and loosely-typed rows into correct,
//!   safely escaped statements against one database file.
//! - Own the lifecycle around that file: backups, restores and CSV
//!   interchange.
//!
//! # Architectural Boundaries
//!
//! - [`SqliteStore`] is the only owner of the connection; every operation
//!   goes through it.
//! - Values reach statement text only through [`Value::coerce`] and
//!   [`Value::to_sql_literal`].
//! - WHERE conditions and CHECK expressions are passed to the engine
//!   verbatim. See [`statement`] for what that implies.
//! - Transport, process bootstrap and logging setup belong to the host.

pub mod args;
pub mod backup;
pub mod config;
pub mod csv_bridge;
pub mod error;
pub mod introspect;
pub mod schema;
pub mod sqlite;
pub mod statement;
pub mod value;

pub use backup::BackupEntry;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use introspect::{ColumnInfo, DatabaseInfo, IndexInfo, TableInfo};
pub use schema::{ColumnDefinition, DefaultValue, Schema, TableSchema};
pub use sqlite::{ExecOutcome, SqliteStore};
pub use statement::Row;
pub use value::{DataType, Value};
