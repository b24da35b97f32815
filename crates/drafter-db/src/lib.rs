pub mod migration;
pub mod ops;
pub mod schema;

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use drafter_core::error::DrafterError;

/// Open (or create) the Drafter database at the given path and run migrations.
pub fn open_db(path: &Path) -> Result<Connection, DrafterError> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    migration::run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database for testing.
pub fn open_memory_db() -> Result<Connection, DrafterError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    migration::run_migrations(&conn)?;
    Ok(conn)
}

/// Shared handle to one Drafter database.
///
/// Services clone the handle freely; every access goes through the inner
/// mutex, so a multi-step read-modify-write in one service call is atomic
/// with respect to all other tasks in this process. Holders must not keep
/// the guard across network calls.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, DrafterError> {
        Ok(Self {
            conn: Arc::new(Mutex::new(open_db(path)?)),
        })
    }

    /// In-memory database for testing.
    pub fn open_memory() -> Result<Self, DrafterError> {
        Ok(Self {
            conn: Arc::new(Mutex::new(open_memory_db()?)),
        })
    }

    /// Acquire the connection.
    pub async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_db_creates_file_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drafter.db");

        let conn = open_db(&path).unwrap();
        drop(conn);
        assert!(path.exists());

        // Second open must tolerate the already-applied schema.
        let conn = open_db(&path).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM branches", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }
}
