// src/db/mod.rs

//! SQLite connection management
//!
//! `init` creates the database file and applies migrations; `open`
//! returns a connection with the schema brought up to date.
//! `transaction` wraps a closure in a rusqlite transaction, committing
//! on Ok and rolling back on Err.

pub mod models;
pub mod paths;
pub mod schema;

use crate::error::Result;
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the database (and its parent directory) and apply migrations.
pub fn init(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = open(db_path)?;
    drop(conn);
    debug!("Initialized database at {}", db_path);
    Ok(())
}

/// Open a connection and make sure the schema is current.
pub fn open(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open a private in-memory database, for tests and ephemeral runs.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Run `f` inside a transaction. The transaction commits when `f`
/// returns Ok and rolls back (on drop) when it returns Err.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::NamedTempFile;

    #[test]
    fn test_init_and_open() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();

        init(&db_path).unwrap();
        let conn = open(&db_path).unwrap();
        assert_eq!(
            schema::get_schema_version(&conn).unwrap(),
            schema::SCHEMA_VERSION
        );
        drop(temp_file);
    }

    #[test]
    fn test_init_creates_parent_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("a").join("b").join("simdex.db");
        let db_path = nested.to_str().unwrap().to_string();

        init(&db_path).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let mut conn = open_in_memory().unwrap();
        transaction(&mut conn, |tx| {
            tx.execute(
                "INSERT INTO user_files (path, file_name, size, mtime_ms, scanned_at)
                 VALUES ('a.package', 'a.package', 1, 1, 'now')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_files", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let mut conn = open_in_memory().unwrap();
        let result: Result<()> = transaction(&mut conn, |tx| {
            tx.execute(
                "INSERT INTO user_files (path, file_name, size, mtime_ms, scanned_at)
                 VALUES ('a.package', 'a.package', 1, 1, 'now')",
                [],
            )?;
            Err(Error::Cancelled)
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_files", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
