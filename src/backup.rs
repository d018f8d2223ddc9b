//! Snapshots of the live database file.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::backup::{Backup, StepResult};
use rusqlite::{Connection, ErrorCode};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::sqlite::SqliteStore;

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const SIDECARS: [&str; 3] = ["-wal", "-shm", "-journal"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupEntry {
    pub filename: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

impl SqliteStore {
    /// Writes a consistent point-in-time copy of the live database to
    /// `destination`, overwriting it. Pending work is committed first.
    pub fn backup(&mut self, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        if resolved(destination) == resolved(self.path()) {
            return Err(StoreError::Backup(format!(
                "'{}' is the live database",
                destination.display()
            )));
        }
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        self.flush()?;
        let conn = self.conn()?;
        conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;

        let mut target = Connection::open(destination).map_err(|e| StoreError::io(destination, e))?;
        // A zero timeout disables the busy handler, so a locked target fails now.
        target.busy_timeout(self.config().busy_timeout.unwrap_or_default())?;
        copy_pages(conn, &mut target, destination)?;
        target
            .close()
            .map_err(|(_, e)| backup_failure(destination, e))?;

        info!(
            source = %self.path().display(),
            destination = %destination.display(),
            "database backed up"
        );
        Ok(())
    }

    /// Replaces the live database with the snapshot at `source`. The handle
    /// is closed around the swap and reopened afterwards.
    pub fn restore(&mut self, source: impl AsRef<Path>) -> Result<()> {
        let source = source.as_ref();
        check_snapshot(source)?;
        let live = self.path().to_path_buf();
        if resolved(source) == resolved(&live) {
            return Err(StoreError::Backup(format!(
                "'{}' is the live database",
                source.display()
            )));
        }

        // Stage next to the live file so the final swap is a rename.
        let staging = staging_path(&live);
        fs::copy(source, &staging).map_err(|e| StoreError::io(source, e))?;

        if let Err(err) = self.release() {
            discard(&staging);
            return Err(err);
        }
        let swapped = swap_in(&staging, &live);
        let reopened = self.reacquire();
        swapped?;
        reopened?;

        info!(
            source = %source.display(),
            destination = %live.display(),
            "database restored"
        );
        Ok(())
    }

    /// Snapshots in the configured backup directory, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        let live = resolved(self.path());
        let mut entries = scan_backups(&self.config().backup_dir())?;
        entries.retain(|entry| resolved(&entry.path) != live);
        Ok(entries)
    }
}

/// Lists the SQLite files directly inside `dir`, newest first. A missing
/// directory holds no backups.
pub fn scan_backups(dir: &Path) -> Result<Vec<BackupEntry>> {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut entries = Vec::new();
    for entry in listing {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| StoreError::io(&path, e))?;
        if !metadata.is_file() || !has_sqlite_header(&path) {
            continue;
        }
        // mtime, so a snapshot overwritten in place reports its newest write
        let created = metadata.modified().map_err(|e| StoreError::io(&path, e))?;
        entries.push(BackupEntry {
            filename: entry.file_name().to_string_lossy().into_owned(),
            path,
            created_at: DateTime::<Utc>::from(created),
            size: metadata.len(),
        });
    }
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    Ok(entries)
}

fn copy_pages(source: &Connection, target: &mut Connection, destination: &Path) -> Result<()> {
    let backup = Backup::new(source, target).map_err(|e| backup_failure(destination, e))?;
    loop {
        match backup.step(-1).map_err(|e| backup_failure(destination, e))? {
            StepResult::Done => return Ok(()),
            StepResult::More => continue,
            _ => {
                return Err(StoreError::Backup(format!(
                    "destination '{}' is in use by another connection",
                    destination.display()
                )))
            }
        }
    }
}

fn backup_failure(destination: &Path, err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::Backup(format!(
            "destination '{}' is in use by another connection",
            destination.display()
        )),
        _ => StoreError::from(err).located(destination.display()),
    }
}

fn check_snapshot(source: &Path) -> Result<()> {
    let metadata = match fs::metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(format!(
                "backup '{}' does not exist",
                source.display()
            )))
        }
        Err(e) => return Err(StoreError::io(source, e)),
    };
    if !metadata.is_file() || !has_sqlite_header(source) {
        return Err(StoreError::Backup(format!(
            "'{}' is not a SQLite snapshot",
            source.display()
        )));
    }
    Ok(())
}

fn has_sqlite_header(path: &Path) -> bool {
    let mut header = [0u8; 16];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut header))
        .map(|()| &header == SQLITE_HEADER)
        .unwrap_or(false)
}

fn staging_path(live: &Path) -> PathBuf {
    let mut name = live.file_name().unwrap_or_default().to_os_string();
    name.push(".restoring");
    live.with_file_name(name)
}

fn swap_in(staging: &Path, live: &Path) -> Result<()> {
    for suffix in SIDECARS {
        let mut sidecar = live.as_os_str().to_os_string();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        match fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                discard(staging);
                return Err(StoreError::io(&sidecar, e));
            }
        }
    }
    fs::rename(staging, live).map_err(|e| {
        discard(staging);
        StoreError::io(live, e)
    })
}

fn discard(staging: &Path) {
    if let Err(err) = fs::remove_file(staging) {
        warn!(path = %staging.display(), error = %err, "failed to remove staging file");
    }
}

/// Canonical form of `path`, resolving the parent when the file itself does
/// not exist yet.
fn resolved(path: &Path) -> PathBuf {
    if let Ok(path) = fs::canonicalize(path) {
        return path;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}
