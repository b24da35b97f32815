use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use drafter_core::error::DrafterError;
use drafter_core::models::branch::{Branch, BranchId};
use drafter_core::models::commit::CommitId;
use drafter_core::models::{ProjectId, UserId};

use super::{fmt_dt, parse_dt};

const BRANCH_COLUMNS: &str = "id, project_id, name, user_id, base_commit_id, head_commit_id, is_default, created_at, updated_at";

pub fn insert_branch(conn: &Connection, branch: &Branch) -> Result<(), DrafterError> {
    conn.execute(
        "INSERT INTO branches (id, project_id, name, user_id, base_commit_id, head_commit_id, is_default, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            branch.id.0.to_string(),
            branch.project_id.0.to_string(),
            branch.name,
            branch.user_id.as_ref().map(|u| u.0.to_string()),
            branch.base_commit_id.as_ref().map(|c| c.0.to_string()),
            branch.head_commit_id.as_ref().map(|c| c.0.to_string()),
            branch.is_default as i32,
            fmt_dt(&branch.created_at),
            fmt_dt(&branch.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_branch(conn: &Connection, id: &BranchId) -> Result<Option<Branch>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![id.0.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_branch(row)?)),
        None => Ok(None),
    }
}

pub fn get_main_branch(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<Option<Branch>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 AND is_default = 1"
    ))?;
    let mut rows = stmt.query(params![project_id.0.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_branch(row)?)),
        None => Ok(None),
    }
}

pub fn get_draft_branch(
    conn: &Connection,
    project_id: &ProjectId,
    user_id: &UserId,
) -> Result<Option<Branch>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 AND user_id = ?2"
    ))?;
    let mut rows = stmt.query(params![project_id.0.to_string(), user_id.0.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_branch(row)?)),
        None => Ok(None),
    }
}

/// Draft rows written before ownership was keyed: the draft name is present
/// but `user_id` was never stored.
pub fn get_legacy_draft_branch(
    conn: &Connection,
    project_id: &ProjectId,
    name: &str,
) -> Result<Option<Branch>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BRANCH_COLUMNS} FROM branches
         WHERE project_id = ?1 AND name = ?2 AND user_id IS NULL AND is_default = 0"
    ))?;
    let mut rows = stmt.query(params![project_id.0.to_string(), name])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_branch(row)?)),
        None => Ok(None),
    }
}

pub fn list_project_branches(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<Vec<Branch>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 ORDER BY created_at"
    ))?;
    let rows = stmt.query_map(params![project_id.0.to_string()], |row| row_to_branch(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn set_branch_user(
    conn: &Connection,
    id: &BranchId,
    user_id: &UserId,
    ts: &DateTime<Utc>,
) -> Result<(), DrafterError> {
    conn.execute(
        "UPDATE branches SET user_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![user_id.0.to_string(), fmt_dt(ts), id.0.to_string()],
    )?;
    Ok(())
}

pub fn update_branch_head(
    conn: &Connection,
    id: &BranchId,
    head: &CommitId,
    ts: &DateTime<Utc>,
) -> Result<(), DrafterError> {
    conn.execute(
        "UPDATE branches SET head_commit_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![head.0.to_string(), fmt_dt(ts), id.0.to_string()],
    )?;
    Ok(())
}

/// Rewrite a branch's fork point wholesale. Used when a keyed draft adopts
/// the history of a legacy row.
pub fn update_branch_fork(
    conn: &Connection,
    id: &BranchId,
    head: Option<&CommitId>,
    base: Option<&CommitId>,
    ts: &DateTime<Utc>,
) -> Result<(), DrafterError> {
    conn.execute(
        "UPDATE branches SET head_commit_id = ?1, base_commit_id = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            head.map(|c| c.0.to_string()),
            base.map(|c| c.0.to_string()),
            fmt_dt(ts),
            id.0.to_string(),
        ],
    )?;
    Ok(())
}

pub fn delete_project_branches(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "DELETE FROM branches WHERE project_id = ?1",
        params![project_id.0.to_string()],
    )?;
    Ok(n)
}

fn row_to_branch(row: &rusqlite::Row) -> rusqlite::Result<Branch> {
    let id_str: String = row.get(0)?;
    let project_str: String = row.get(1)?;
    let name: String = row.get(2)?;
    let user_str: Option<String> = row.get(3)?;
    let base_str: Option<String> = row.get(4)?;
    let head_str: Option<String> = row.get(5)?;
    let is_default: i32 = row.get(6)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    Ok(Branch {
        id: BranchId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        project_id: ProjectId::from_uuid(Uuid::parse_str(&project_str).unwrap_or_default()),
        name,
        user_id: user_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(UserId::from_uuid),
        base_commit_id: base_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(CommitId::from_uuid),
        head_commit_id: head_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(CommitId::from_uuid),
        is_default: is_default != 0,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}
