use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use drafter_core::error::DrafterError;
use drafter_core::models::branch::BranchId;
use drafter_core::models::file::{FileId, FileKind, FolderId, WorkingFile, WorkingFolder};
use drafter_core::models::snapshot::{PendingChange, PendingChangeId, PendingChangeKind};
use drafter_core::models::ProjectId;

use super::{fmt_dt, parse_dt};

const FILE_COLUMNS: &str = "id, branch_id, project_id, folder_id, name, kind, content, content_hash, is_deleted, created_at, updated_at";
const FOLDER_COLUMNS: &str = "id, branch_id, project_id, parent_id, name, is_deleted, created_at, updated_at";

// ── Working files ──

pub fn insert_file(conn: &Connection, file: &WorkingFile) -> Result<(), DrafterError> {
    conn.execute(
        "INSERT INTO working_files (id, branch_id, project_id, folder_id, name, kind, content, content_hash, is_deleted, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            file.id.0.to_string(),
            file.branch_id.0.to_string(),
            file.project_id.0.to_string(),
            file.folder_id.as_ref().map(|f| f.0.to_string()),
            file.name,
            file.kind.to_string(),
            file.content,
            file.content_hash,
            file.is_deleted as i32,
            fmt_dt(&file.created_at),
            fmt_dt(&file.updated_at),
        ],
    )?;
    Ok(())
}

/// Live file at a worktree path. Identity is folder + name + kind.
pub fn get_file_at_path(
    conn: &Connection,
    branch_id: &BranchId,
    folder_id: Option<&FolderId>,
    name: &str,
    kind: FileKind,
) -> Result<Option<WorkingFile>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM working_files
         WHERE branch_id = ?1 AND name = ?2 AND kind = ?3 AND is_deleted = 0
           AND ((?4 IS NULL AND folder_id IS NULL) OR folder_id = ?4)"
    ))?;
    let mut rows = stmt.query(params![
        branch_id.0.to_string(),
        name,
        kind.to_string(),
        folder_id.map(|f| f.0.to_string()),
    ])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_file(row)?)),
        None => Ok(None),
    }
}

pub fn list_branch_files(
    conn: &Connection,
    branch_id: &BranchId,
    include_deleted: bool,
) -> Result<Vec<WorkingFile>, DrafterError> {
    let sql = if include_deleted {
        format!("SELECT {FILE_COLUMNS} FROM working_files WHERE branch_id = ?1 ORDER BY name")
    } else {
        format!(
            "SELECT {FILE_COLUMNS} FROM working_files
             WHERE branch_id = ?1 AND is_deleted = 0 ORDER BY name"
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![branch_id.0.to_string()], |row| row_to_file(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn update_file_content(
    conn: &Connection,
    id: &FileId,
    content: &str,
    content_hash: &str,
    ts: &DateTime<Utc>,
) -> Result<(), DrafterError> {
    conn.execute(
        "UPDATE working_files SET content = ?1, content_hash = ?2, is_deleted = 0, updated_at = ?3
         WHERE id = ?4",
        params![content, content_hash, fmt_dt(ts), id.0.to_string()],
    )?;
    Ok(())
}

pub fn soft_delete_file(
    conn: &Connection,
    id: &FileId,
    ts: &DateTime<Utc>,
) -> Result<bool, DrafterError> {
    let n = conn.execute(
        "UPDATE working_files SET is_deleted = 1, updated_at = ?1 WHERE id = ?2 AND is_deleted = 0",
        params![fmt_dt(ts), id.0.to_string()],
    )?;
    Ok(n > 0)
}

pub fn soft_delete_branch_files(
    conn: &Connection,
    branch_id: &BranchId,
    ts: &DateTime<Utc>,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "UPDATE working_files SET is_deleted = 1, updated_at = ?1
         WHERE branch_id = ?2 AND is_deleted = 0",
        params![fmt_dt(ts), branch_id.0.to_string()],
    )?;
    Ok(n)
}

pub fn delete_project_files(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "DELETE FROM working_files WHERE project_id = ?1",
        params![project_id.0.to_string()],
    )?;
    Ok(n)
}

// ── Working folders ──

pub fn insert_folder(conn: &Connection, folder: &WorkingFolder) -> Result<(), DrafterError> {
    conn.execute(
        "INSERT INTO working_folders (id, branch_id, project_id, parent_id, name, is_deleted, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            folder.id.0.to_string(),
            folder.branch_id.0.to_string(),
            folder.project_id.0.to_string(),
            folder.parent_id.as_ref().map(|f| f.0.to_string()),
            folder.name,
            folder.is_deleted as i32,
            fmt_dt(&folder.created_at),
            fmt_dt(&folder.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_branch_folders(
    conn: &Connection,
    branch_id: &BranchId,
    include_deleted: bool,
) -> Result<Vec<WorkingFolder>, DrafterError> {
    let sql = if include_deleted {
        format!("SELECT {FOLDER_COLUMNS} FROM working_folders WHERE branch_id = ?1 ORDER BY name")
    } else {
        format!(
            "SELECT {FOLDER_COLUMNS} FROM working_folders
             WHERE branch_id = ?1 AND is_deleted = 0 ORDER BY name"
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![branch_id.0.to_string()], |row| row_to_folder(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete_project_folders(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "DELETE FROM working_folders WHERE project_id = ?1",
        params![project_id.0.to_string()],
    )?;
    Ok(n)
}

// ── Pending changes ──

pub fn insert_pending_change(conn: &Connection, change: &PendingChange) -> Result<(), DrafterError> {
    conn.execute(
        "INSERT INTO pending_changes (id, branch_id, working_file_id, change_type, previous_content_hash, new_content_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            change.id.0.to_string(),
            change.branch_id.0.to_string(),
            change.working_file_id.0.to_string(),
            change.change_type.to_string(),
            change.previous_content_hash,
            change.new_content_hash,
            fmt_dt(&change.created_at),
        ],
    )?;
    Ok(())
}

pub fn list_pending_changes(
    conn: &Connection,
    branch_id: &BranchId,
    limit: usize,
) -> Result<Vec<PendingChange>, DrafterError> {
    let mut stmt = conn.prepare(
        "SELECT id, branch_id, working_file_id, change_type, previous_content_hash, new_content_hash, created_at
         FROM pending_changes WHERE branch_id = ?1 ORDER BY created_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![branch_id.0.to_string(), limit as i64], |row| {
        row_to_pending_change(row)
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete_project_pending_changes(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "DELETE FROM pending_changes WHERE branch_id IN
             (SELECT id FROM branches WHERE project_id = ?1)",
        params![project_id.0.to_string()],
    )?;
    Ok(n)
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<WorkingFile> {
    let id_str: String = row.get(0)?;
    let branch_str: String = row.get(1)?;
    let project_str: String = row.get(2)?;
    let folder_str: Option<String> = row.get(3)?;
    let name: String = row.get(4)?;
    let kind_str: String = row.get(5)?;
    let content: String = row.get(6)?;
    let content_hash: String = row.get(7)?;
    let is_deleted: i32 = row.get(8)?;
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    Ok(WorkingFile {
        id: FileId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        branch_id: BranchId::from_uuid(Uuid::parse_str(&branch_str).unwrap_or_default()),
        project_id: ProjectId::from_uuid(Uuid::parse_str(&project_str).unwrap_or_default()),
        folder_id: folder_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(FolderId::from_uuid),
        name,
        kind: kind_str.parse().unwrap_or(FileKind::Bpmn),
        content,
        content_hash,
        is_deleted: is_deleted != 0,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}

fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<WorkingFolder> {
    let id_str: String = row.get(0)?;
    let branch_str: String = row.get(1)?;
    let project_str: String = row.get(2)?;
    let parent_str: Option<String> = row.get(3)?;
    let name: String = row.get(4)?;
    let is_deleted: i32 = row.get(5)?;
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;

    Ok(WorkingFolder {
        id: FolderId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        branch_id: BranchId::from_uuid(Uuid::parse_str(&branch_str).unwrap_or_default()),
        project_id: ProjectId::from_uuid(Uuid::parse_str(&project_str).unwrap_or_default()),
        parent_id: parent_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(FolderId::from_uuid),
        name,
        is_deleted: is_deleted != 0,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}

fn row_to_pending_change(row: &rusqlite::Row) -> rusqlite::Result<PendingChange> {
    let id_str: String = row.get(0)?;
    let branch_str: String = row.get(1)?;
    let file_str: String = row.get(2)?;
    let change_str: String = row.get(3)?;
    let previous_content_hash: Option<String> = row.get(4)?;
    let new_content_hash: Option<String> = row.get(5)?;
    let created_str: String = row.get(6)?;

    Ok(PendingChange {
        id: PendingChangeId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        branch_id: BranchId::from_uuid(Uuid::parse_str(&branch_str).unwrap_or_default()),
        working_file_id: FileId::from_uuid(Uuid::parse_str(&file_str).unwrap_or_default()),
        change_type: change_str.parse().unwrap_or(PendingChangeKind::Update),
        previous_content_hash,
        new_content_hash,
        created_at: parse_dt(&created_str),
    })
}

#[cfg(test)]
mod tests {
    use drafter_core::models::branch::Branch;

    use super::super::insert_branch;
    use super::*;
    use crate::open_memory_db;

    fn seeded_branch(conn: &Connection) -> Branch {
        let branch = Branch::main(ProjectId::new());
        insert_branch(conn, &branch).unwrap();
        branch
    }

    #[test]
    fn test_file_roundtrip_at_path() {
        let conn = open_memory_db().unwrap();
        let branch = seeded_branch(&conn);

        let file = WorkingFile::new(
            branch.id.clone(),
            branch.project_id.clone(),
            None,
            "Order flow".to_string(),
            FileKind::Bpmn,
            "<xml/>".to_string(),
        );
        insert_file(&conn, &file).unwrap();

        let found = get_file_at_path(&conn, &branch.id, None, "Order flow", FileKind::Bpmn)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, file.id);
        assert_eq!(found.content, "<xml/>");

        // Same name under a different kind is a different path.
        assert!(
            get_file_at_path(&conn, &branch.id, None, "Order flow", FileKind::Dmn)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_soft_delete_hides_file_from_live_listing() {
        let conn = open_memory_db().unwrap();
        let branch = seeded_branch(&conn);
        let file = WorkingFile::new(
            branch.id.clone(),
            branch.project_id.clone(),
            None,
            "Rates".to_string(),
            FileKind::Dmn,
            "v1".to_string(),
        );
        insert_file(&conn, &file).unwrap();

        assert!(soft_delete_file(&conn, &file.id, &Utc::now()).unwrap());
        // Already deleted, nothing to update.
        assert!(!soft_delete_file(&conn, &file.id, &Utc::now()).unwrap());

        assert!(list_branch_files(&conn, &branch.id, false).unwrap().is_empty());
        assert_eq!(list_branch_files(&conn, &branch.id, true).unwrap().len(), 1);
    }

    #[test]
    fn test_folder_parent_roundtrip() {
        let conn = open_memory_db().unwrap();
        let branch = seeded_branch(&conn);

        let parent = WorkingFolder::new(
            branch.id.clone(),
            branch.project_id.clone(),
            None,
            "Claims".to_string(),
        );
        insert_folder(&conn, &parent).unwrap();
        let child = WorkingFolder::new(
            branch.id.clone(),
            branch.project_id.clone(),
            Some(parent.id.clone()),
            "Approved".to_string(),
        );
        insert_folder(&conn, &child).unwrap();

        let listed = list_branch_folders(&conn, &branch.id, false).unwrap();
        let found = listed.iter().find(|f| f.id == child.id).unwrap();
        assert_eq!(found.parent_id, Some(parent.id.clone()));
    }

    #[test]
    fn test_pending_changes_list_newest_first() {
        let conn = open_memory_db().unwrap();
        let branch = seeded_branch(&conn);
        let file_id = FileId::new();

        for (i, kind) in [
            PendingChangeKind::Create,
            PendingChangeKind::Update,
            PendingChangeKind::Delete,
        ]
        .into_iter()
        .enumerate()
        {
            let mut change =
                PendingChange::new(branch.id.clone(), file_id.clone(), kind, None, None);
            change.created_at = Utc::now() + chrono::Duration::seconds(i as i64);
            insert_pending_change(&conn, &change).unwrap();
        }

        let listed = list_pending_changes(&conn, &branch.id, 2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].change_type, PendingChangeKind::Delete);
        assert_eq!(listed[1].change_type, PendingChangeKind::Update);
    }
}
