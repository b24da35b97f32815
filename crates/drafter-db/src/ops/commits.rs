use rusqlite::{params, Connection};
use uuid::Uuid;

use drafter_core::error::DrafterError;
use drafter_core::models::branch::BranchId;
use drafter_core::models::commit::{Commit, CommitId};
use drafter_core::models::file::{FileId, FileKind, FolderId};
use drafter_core::models::snapshot::{ChangeType, FileSnapshot, SnapshotId};
use drafter_core::models::{ProjectId, UserId};

use super::{fmt_dt, parse_dt};

const COMMIT_COLUMNS: &str = "id, project_id, branch_id, parent_commit_id, user_id, message, hash, version_number, is_remote, created_at";

pub fn insert_commit(conn: &Connection, commit: &Commit) -> Result<(), DrafterError> {
    conn.execute(
        "INSERT INTO commits (id, project_id, branch_id, parent_commit_id, user_id, message, hash, version_number, is_remote, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            commit.id.0.to_string(),
            commit.project_id.0.to_string(),
            commit.branch_id.0.to_string(),
            commit.parent_commit_id.as_ref().map(|c| c.0.to_string()),
            commit.user_id.0.to_string(),
            commit.message,
            commit.hash,
            commit.version_number,
            commit.is_remote as i32,
            fmt_dt(&commit.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_commit(conn: &Connection, id: &CommitId) -> Result<Option<Commit>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMMIT_COLUMNS} FROM commits WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![id.0.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_commit(row)?)),
        None => Ok(None),
    }
}

/// Commits recorded against a branch, local and remote alike.
pub fn count_branch_commits(conn: &Connection, branch_id: &BranchId) -> Result<u32, DrafterError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM commits WHERE branch_id = ?1",
        params![branch_id.0.to_string()],
        |row| row.get(0),
    )?;
    Ok(n as u32)
}

/// Local commits only; remote audit rows never carry a version number.
pub fn count_local_branch_commits(
    conn: &Connection,
    branch_id: &BranchId,
) -> Result<u32, DrafterError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM commits WHERE branch_id = ?1 AND is_remote = 0",
        params![branch_id.0.to_string()],
        |row| row.get(0),
    )?;
    Ok(n as u32)
}

pub fn insert_snapshot(conn: &Connection, snap: &FileSnapshot) -> Result<(), DrafterError> {
    conn.execute(
        "INSERT INTO file_snapshots (id, commit_id, working_file_id, folder_id, name, kind, content, content_hash, change_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            snap.id.0.to_string(),
            snap.commit_id.0.to_string(),
            snap.working_file_id.0.to_string(),
            snap.folder_id.as_ref().map(|f| f.0.to_string()),
            snap.name,
            snap.kind.to_string(),
            snap.content,
            snap.content_hash,
            snap.change_type.to_string(),
        ],
    )?;
    Ok(())
}

pub fn snapshots_for_commit(
    conn: &Connection,
    commit_id: &CommitId,
) -> Result<Vec<FileSnapshot>, DrafterError> {
    let mut stmt = conn.prepare(
        "SELECT id, commit_id, working_file_id, folder_id, name, kind, content, content_hash, change_type
         FROM file_snapshots WHERE commit_id = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![commit_id.0.to_string()], |row| {
        row_to_snapshot(row)
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete_project_commits(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "DELETE FROM commits WHERE project_id = ?1",
        params![project_id.0.to_string()],
    )?;
    Ok(n)
}

pub fn delete_project_snapshots(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "DELETE FROM file_snapshots WHERE commit_id IN
             (SELECT id FROM commits WHERE project_id = ?1)",
        params![project_id.0.to_string()],
    )?;
    Ok(n)
}

fn row_to_commit(row: &rusqlite::Row) -> rusqlite::Result<Commit> {
    let id_str: String = row.get(0)?;
    let project_str: String = row.get(1)?;
    let branch_str: String = row.get(2)?;
    let parent_str: Option<String> = row.get(3)?;
    let user_str: String = row.get(4)?;
    let message: String = row.get(5)?;
    let hash: String = row.get(6)?;
    let version_number: Option<u32> = row.get(7)?;
    let is_remote: i32 = row.get(8)?;
    let created_str: String = row.get(9)?;

    Ok(Commit {
        id: CommitId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        project_id: ProjectId::from_uuid(Uuid::parse_str(&project_str).unwrap_or_default()),
        branch_id: BranchId::from_uuid(Uuid::parse_str(&branch_str).unwrap_or_default()),
        parent_commit_id: parent_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(CommitId::from_uuid),
        user_id: UserId::from_uuid(Uuid::parse_str(&user_str).unwrap_or_default()),
        message,
        hash,
        version_number,
        is_remote: is_remote != 0,
        created_at: parse_dt(&created_str),
    })
}

fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<FileSnapshot> {
    let id_str: String = row.get(0)?;
    let commit_str: String = row.get(1)?;
    let file_str: String = row.get(2)?;
    let folder_str: Option<String> = row.get(3)?;
    let name: String = row.get(4)?;
    let kind_str: String = row.get(5)?;
    let content: Option<String> = row.get(6)?;
    let content_hash: Option<String> = row.get(7)?;
    let change_str: String = row.get(8)?;

    Ok(FileSnapshot {
        id: SnapshotId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        commit_id: CommitId::from_uuid(Uuid::parse_str(&commit_str).unwrap_or_default()),
        working_file_id: FileId::from_uuid(Uuid::parse_str(&file_str).unwrap_or_default()),
        folder_id: folder_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(FolderId::from_uuid),
        name,
        kind: kind_str.parse().unwrap_or(FileKind::Bpmn),
        content,
        content_hash,
        change_type: change_str.parse().unwrap_or(ChangeType::Modified),
    })
}
