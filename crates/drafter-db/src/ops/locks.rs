use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use drafter_core::error::DrafterError;
use drafter_core::models::file::FileId;
use drafter_core::models::lock::{FileLock, LockId};
use drafter_core::models::{ProjectId, UserId};

use super::{fmt_dt, opt_dt, parse_dt};

const LOCK_COLUMNS: &str =
    "id, file_id, user_id, acquired_at, expires_at, heartbeat_at, released, released_at";

pub fn insert_lock(conn: &Connection, lock: &FileLock) -> Result<(), DrafterError> {
    conn.execute(
        "INSERT INTO file_locks (id, file_id, user_id, acquired_at, expires_at, heartbeat_at, released, released_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            lock.id.0.to_string(),
            lock.file_id.0.to_string(),
            lock.user_id.0.to_string(),
            fmt_dt(&lock.acquired_at),
            fmt_dt(&lock.expires_at),
            fmt_dt(&lock.heartbeat_at),
            lock.released as i32,
            opt_dt(&lock.released_at),
        ],
    )?;
    Ok(())
}

/// Raw insert result, exposed so the caller can tell a lost race (unique
/// index violation on the active row) apart from other failures.
pub fn try_insert_lock(conn: &Connection, lock: &FileLock) -> Result<bool, DrafterError> {
    let res = conn.execute(
        "INSERT INTO file_locks (id, file_id, user_id, acquired_at, expires_at, heartbeat_at, released, released_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            lock.id.0.to_string(),
            lock.file_id.0.to_string(),
            lock.user_id.0.to_string(),
            fmt_dt(&lock.acquired_at),
            fmt_dt(&lock.expires_at),
            fmt_dt(&lock.heartbeat_at),
            lock.released as i32,
            opt_dt(&lock.released_at),
        ],
    );
    match res {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_lock(conn: &Connection, id: &LockId) -> Result<Option<FileLock>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOCK_COLUMNS} FROM file_locks WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![id.0.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_lock(row)?)),
        None => Ok(None),
    }
}

/// The unreleased, unexpired lock on a file, if any.
pub fn active_lock_for_file(
    conn: &Connection,
    file_id: &FileId,
    now: &DateTime<Utc>,
) -> Result<Option<FileLock>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOCK_COLUMNS} FROM file_locks
         WHERE file_id = ?1 AND released = 0 AND expires_at > ?2"
    ))?;
    let mut rows = stmt.query(params![file_id.0.to_string(), fmt_dt(now)])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_lock(row)?)),
        None => Ok(None),
    }
}

pub fn release_lock(conn: &Connection, id: &LockId, now: &DateTime<Utc>) -> Result<bool, DrafterError> {
    let n = conn.execute(
        "UPDATE file_locks SET released = 1, released_at = ?1 WHERE id = ?2 AND released = 0",
        params![fmt_dt(now), id.0.to_string()],
    )?;
    Ok(n > 0)
}

/// Flip expired-but-unreleased rows for one file so the active-row index
/// slot is free again. Runs inside the acquire transaction.
pub fn release_expired_for_file(
    conn: &Connection,
    file_id: &FileId,
    now: &DateTime<Utc>,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "UPDATE file_locks SET released = 1, released_at = ?1
         WHERE file_id = ?2 AND released = 0 AND expires_at <= ?1",
        params![fmt_dt(now), file_id.0.to_string()],
    )?;
    Ok(n)
}

/// Extend a still-held lease. A released row is never revived.
pub fn renew_lock(
    conn: &Connection,
    id: &LockId,
    heartbeat_at: &DateTime<Utc>,
    expires_at: &DateTime<Utc>,
) -> Result<bool, DrafterError> {
    let n = conn.execute(
        "UPDATE file_locks SET heartbeat_at = ?1, expires_at = ?2 WHERE id = ?3 AND released = 0",
        params![fmt_dt(heartbeat_at), fmt_dt(expires_at), id.0.to_string()],
    )?;
    Ok(n > 0)
}

/// Release every lapsed row in one statement; returns how many were swept.
pub fn release_expired_locks(conn: &Connection, now: &DateTime<Utc>) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "UPDATE file_locks SET released = 1, released_at = ?1
         WHERE released = 0 AND expires_at <= ?1",
        params![fmt_dt(now)],
    )?;
    Ok(n)
}

pub fn active_locks_for_user(
    conn: &Connection,
    user_id: &UserId,
    now: &DateTime<Utc>,
) -> Result<Vec<FileLock>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOCK_COLUMNS} FROM file_locks
         WHERE user_id = ?1 AND released = 0 AND expires_at > ?2 ORDER BY acquired_at"
    ))?;
    let rows = stmt.query_map(params![user_id.0.to_string(), fmt_dt(now)], |row| {
        row_to_lock(row)
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Active locks across a project's live files, with each file's name.
pub fn project_locks(
    conn: &Connection,
    project_id: &ProjectId,
    now: &DateTime<Utc>,
) -> Result<Vec<(FileLock, String)>, DrafterError> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.file_id, l.user_id, l.acquired_at, l.expires_at, l.heartbeat_at, l.released, l.released_at, f.name
         FROM file_locks l
         JOIN working_files f ON f.id = l.file_id
         WHERE f.project_id = ?1 AND l.released = 0 AND l.expires_at > ?2
         ORDER BY l.acquired_at",
    )?;
    let rows = stmt.query_map(params![project_id.0.to_string(), fmt_dt(now)], |row| {
        let lock = row_to_lock(row)?;
        let name: String = row.get(8)?;
        Ok((lock, name))
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_lock(row: &rusqlite::Row) -> rusqlite::Result<FileLock> {
    let id_str: String = row.get(0)?;
    let file_str: String = row.get(1)?;
    let user_str: String = row.get(2)?;
    let acquired_str: String = row.get(3)?;
    let expires_str: String = row.get(4)?;
    let heartbeat_str: String = row.get(5)?;
    let released: i32 = row.get(6)?;
    let released_str: Option<String> = row.get(7)?;

    Ok(FileLock {
        id: LockId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        file_id: FileId::from_uuid(Uuid::parse_str(&file_str).unwrap_or_default()),
        user_id: UserId::from_uuid(Uuid::parse_str(&user_str).unwrap_or_default()),
        acquired_at: parse_dt(&acquired_str),
        expires_at: parse_dt(&expires_str),
        heartbeat_at: parse_dt(&heartbeat_str),
        released: released != 0,
        released_at: released_str.map(|s| parse_dt(&s)),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::open_memory_db;

    #[test]
    fn test_active_index_blocks_second_unreleased_row() {
        let conn = open_memory_db().unwrap();
        let file = FileId::new();
        let now = Utc::now();

        let first = FileLock::new(file.clone(), UserId::new(), now, Duration::minutes(30));
        assert!(try_insert_lock(&conn, &first).unwrap());

        let second = FileLock::new(file.clone(), UserId::new(), now, Duration::minutes(30));
        assert!(!try_insert_lock(&conn, &second).unwrap());

        // Releasing the first frees the slot.
        assert!(release_lock(&conn, &first.id, &now).unwrap());
        assert!(try_insert_lock(&conn, &second).unwrap());
    }

    #[test]
    fn test_expired_lock_is_not_active_but_blocks_insert_until_released() {
        let conn = open_memory_db().unwrap();
        let file = FileId::new();
        let now = Utc::now();

        let stale = FileLock::new(file.clone(), UserId::new(), now, Duration::minutes(30));
        insert_lock(&conn, &stale).unwrap();

        let later = now + Duration::minutes(31);
        assert!(active_lock_for_file(&conn, &file, &later).unwrap().is_none());

        // The row still owns the index slot until lazy expiry flips it.
        let fresh = FileLock::new(file.clone(), UserId::new(), later, Duration::minutes(30));
        assert!(!try_insert_lock(&conn, &fresh).unwrap());

        assert_eq!(release_expired_for_file(&conn, &file, &later).unwrap(), 1);
        assert!(try_insert_lock(&conn, &fresh).unwrap());
    }

    #[test]
    fn test_renew_refuses_released_rows() {
        let conn = open_memory_db().unwrap();
        let now = Utc::now();
        let lock = FileLock::new(FileId::new(), UserId::new(), now, Duration::minutes(30));
        insert_lock(&conn, &lock).unwrap();

        let next = now + Duration::seconds(30);
        assert!(renew_lock(&conn, &lock.id, &next, &(next + Duration::minutes(30))).unwrap());

        release_lock(&conn, &lock.id, &next).unwrap();
        assert!(!renew_lock(&conn, &lock.id, &next, &(next + Duration::minutes(30))).unwrap());

        let found = get_lock(&conn, &lock.id).unwrap().unwrap();
        assert!(found.released);
        assert_eq!(found.released_at, Some(next));
    }

    #[test]
    fn test_bulk_release_sweeps_only_lapsed_rows() {
        let conn = open_memory_db().unwrap();
        let now = Utc::now();

        let lapsed = FileLock::new(FileId::new(), UserId::new(), now, Duration::minutes(5));
        let live = FileLock::new(FileId::new(), UserId::new(), now, Duration::minutes(60));
        insert_lock(&conn, &lapsed).unwrap();
        insert_lock(&conn, &live).unwrap();

        let later = now + Duration::minutes(10);
        assert_eq!(release_expired_locks(&conn, &later).unwrap(), 1);
        assert_eq!(release_expired_locks(&conn, &later).unwrap(), 0);

        assert!(active_lock_for_file(&conn, &lapsed.file_id, &later).unwrap().is_none());
        assert!(active_lock_for_file(&conn, &live.file_id, &later).unwrap().is_some());
    }

    #[test]
    fn test_released_at_survives_for_audit() {
        let conn = open_memory_db().unwrap();
        let now = Utc::now();
        let lock = FileLock::new(FileId::new(), UserId::new(), now, Duration::minutes(30));
        insert_lock(&conn, &lock).unwrap();
        release_lock(&conn, &lock.id, &now).unwrap();

        // The row is still there, just released.
        let found = get_lock(&conn, &lock.id).unwrap().unwrap();
        assert!(found.released);
        assert_eq!(found.file_id, lock.file_id);
    }
}
