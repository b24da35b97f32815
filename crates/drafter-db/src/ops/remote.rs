use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use drafter_core::error::DrafterError;
use drafter_core::models::branch::BranchId;
use drafter_core::models::commit::CommitId;
use drafter_core::models::remote::{
    LinkedRepo, LinkedRepoId, ProviderKind, RemoteSyncId, RemoteSyncState, SyncStatus,
};
use drafter_core::models::ProjectId;

use super::{fmt_dt, opt_dt, parse_dt};

const SYNC_COLUMNS: &str = "id, project_id, branch_id, remote_url, remote_branch, last_push_commit_id, last_pull_commit_id, last_push_at, last_pull_at, sync_status";
const REPO_COLUMNS: &str = "id, project_id, provider, full_name, default_branch, last_pushed_manifest, last_commit_sha, connected_at, last_push_at";

// ── Remote sync state ──

pub fn insert_remote_sync(conn: &Connection, state: &RemoteSyncState) -> Result<(), DrafterError> {
    conn.execute(
        "INSERT INTO remote_sync_state (id, project_id, branch_id, remote_url, remote_branch, last_push_commit_id, last_pull_commit_id, last_push_at, last_pull_at, sync_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            state.id.0.to_string(),
            state.project_id.0.to_string(),
            state.branch_id.0.to_string(),
            state.remote_url,
            state.remote_branch,
            state.last_push_commit_id.as_ref().map(|c| c.0.to_string()),
            state.last_pull_commit_id.as_ref().map(|c| c.0.to_string()),
            opt_dt(&state.last_push_at),
            opt_dt(&state.last_pull_at),
            state.sync_status.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_remote_sync(
    conn: &Connection,
    project_id: &ProjectId,
    branch_id: &BranchId,
) -> Result<Option<RemoteSyncState>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SYNC_COLUMNS} FROM remote_sync_state WHERE project_id = ?1 AND branch_id = ?2"
    ))?;
    let mut rows = stmt.query(params![project_id.0.to_string(), branch_id.0.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_sync(row)?)),
        None => Ok(None),
    }
}

/// Record a completed push: remember the local head and flip to `synced`.
pub fn update_last_push(
    conn: &Connection,
    id: &RemoteSyncId,
    commit_id: &CommitId,
    ts: &DateTime<Utc>,
) -> Result<(), DrafterError> {
    conn.execute(
        "UPDATE remote_sync_state
         SET last_push_commit_id = ?1, last_push_at = ?2, sync_status = ?3
         WHERE id = ?4",
        params![
            commit_id.0.to_string(),
            fmt_dt(ts),
            SyncStatus::Synced.to_string(),
            id.0.to_string(),
        ],
    )?;
    Ok(())
}

pub fn delete_project_remote_sync(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "DELETE FROM remote_sync_state WHERE project_id = ?1",
        params![project_id.0.to_string()],
    )?;
    Ok(n)
}

// ── Linked repos ──

pub fn insert_linked_repo(conn: &Connection, repo: &LinkedRepo) -> Result<(), DrafterError> {
    conn.execute(
        "INSERT INTO linked_repos (id, project_id, provider, full_name, default_branch, last_pushed_manifest, last_commit_sha, connected_at, last_push_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            repo.id.0.to_string(),
            repo.project_id.0.to_string(),
            repo.provider.to_string(),
            repo.full_name,
            repo.default_branch,
            repo.last_pushed_manifest,
            repo.last_commit_sha,
            fmt_dt(&repo.connected_at),
            opt_dt(&repo.last_push_at),
        ],
    )?;
    Ok(())
}

pub fn get_linked_repo(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<Option<LinkedRepo>, DrafterError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPO_COLUMNS} FROM linked_repos WHERE project_id = ?1"
    ))?;
    let mut rows = stmt.query(params![project_id.0.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_linked_repo(row)?)),
        None => Ok(None),
    }
}

/// Refresh only the stored manifest, keeping the last commit sha. Used
/// when files were removed but nothing needed pushing.
pub fn update_linked_repo_manifest(
    conn: &Connection,
    id: &LinkedRepoId,
    manifest_json: &str,
) -> Result<(), DrafterError> {
    conn.execute(
        "UPDATE linked_repos SET last_pushed_manifest = ?1 WHERE id = ?2",
        params![manifest_json, id.0.to_string()],
    )?;
    Ok(())
}

/// Store the manifest and commit sha of a push that just landed.
pub fn update_linked_repo_push(
    conn: &Connection,
    id: &LinkedRepoId,
    manifest_json: &str,
    commit_sha: &str,
    ts: &DateTime<Utc>,
) -> Result<(), DrafterError> {
    conn.execute(
        "UPDATE linked_repos
         SET last_pushed_manifest = ?1, last_commit_sha = ?2, last_push_at = ?3
         WHERE id = ?4",
        params![manifest_json, commit_sha, fmt_dt(ts), id.0.to_string()],
    )?;
    Ok(())
}

pub fn delete_project_linked_repo(
    conn: &Connection,
    project_id: &ProjectId,
) -> Result<usize, DrafterError> {
    let n = conn.execute(
        "DELETE FROM linked_repos WHERE project_id = ?1",
        params![project_id.0.to_string()],
    )?;
    Ok(n)
}

fn row_to_sync(row: &rusqlite::Row) -> rusqlite::Result<RemoteSyncState> {
    let id_str: String = row.get(0)?;
    let project_str: String = row.get(1)?;
    let branch_str: String = row.get(2)?;
    let remote_url: String = row.get(3)?;
    let remote_branch: String = row.get(4)?;
    let push_commit_str: Option<String> = row.get(5)?;
    let pull_commit_str: Option<String> = row.get(6)?;
    let push_at_str: Option<String> = row.get(7)?;
    let pull_at_str: Option<String> = row.get(8)?;
    let status_str: String = row.get(9)?;

    Ok(RemoteSyncState {
        id: RemoteSyncId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        project_id: ProjectId::from_uuid(Uuid::parse_str(&project_str).unwrap_or_default()),
        branch_id: BranchId::from_uuid(Uuid::parse_str(&branch_str).unwrap_or_default()),
        remote_url,
        remote_branch,
        last_push_commit_id: push_commit_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(CommitId::from_uuid),
        last_pull_commit_id: pull_commit_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(CommitId::from_uuid),
        last_push_at: push_at_str.map(|s| parse_dt(&s)),
        last_pull_at: pull_at_str.map(|s| parse_dt(&s)),
        sync_status: status_str.parse().unwrap_or(SyncStatus::Ahead),
    })
}

fn row_to_linked_repo(row: &rusqlite::Row) -> rusqlite::Result<LinkedRepo> {
    let id_str: String = row.get(0)?;
    let project_str: String = row.get(1)?;
    let provider_str: String = row.get(2)?;
    let full_name: String = row.get(3)?;
    let default_branch: String = row.get(4)?;
    let last_pushed_manifest: Option<String> = row.get(5)?;
    let last_commit_sha: Option<String> = row.get(6)?;
    let connected_str: String = row.get(7)?;
    let push_at_str: Option<String> = row.get(8)?;

    Ok(LinkedRepo {
        id: LinkedRepoId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        project_id: ProjectId::from_uuid(Uuid::parse_str(&project_str).unwrap_or_default()),
        provider: provider_str.parse().unwrap_or(ProviderKind::GitHub),
        full_name,
        default_branch,
        last_pushed_manifest,
        last_commit_sha,
        connected_at: parse_dt(&connected_str),
        last_push_at: push_at_str.map(|s| parse_dt(&s)),
    })
}

#[cfg(test)]
mod tests {
    use drafter_core::models::branch::Branch;

    use super::super::insert_branch;
    use super::*;
    use crate::open_memory_db;

    #[test]
    fn test_remote_sync_roundtrip_and_push_update() {
        let conn = open_memory_db().unwrap();
        let branch = Branch::main(ProjectId::new());
        insert_branch(&conn, &branch).unwrap();

        let state = RemoteSyncState::new(
            branch.project_id.clone(),
            branch.id.clone(),
            "https://github.com/acme/models.git".to_string(),
            "main".to_string(),
        );
        insert_remote_sync(&conn, &state).unwrap();

        let found = get_remote_sync(&conn, &branch.project_id, &branch.id)
            .unwrap()
            .unwrap();
        assert_eq!(found.sync_status, SyncStatus::Ahead);
        assert!(found.last_push_commit_id.is_none());

        let head = CommitId::new();
        update_last_push(&conn, &state.id, &head, &Utc::now()).unwrap();
        let found = get_remote_sync(&conn, &branch.project_id, &branch.id)
            .unwrap()
            .unwrap();
        assert_eq!(found.last_push_commit_id, Some(head));
        assert_eq!(found.sync_status, SyncStatus::Synced);
        assert!(found.last_push_at.is_some());
    }

    #[test]
    fn test_one_sync_row_per_project_branch() {
        let conn = open_memory_db().unwrap();
        let branch = Branch::main(ProjectId::new());
        insert_branch(&conn, &branch).unwrap();

        let first = RemoteSyncState::new(
            branch.project_id.clone(),
            branch.id.clone(),
            "https://example.com/a.git".to_string(),
            "main".to_string(),
        );
        insert_remote_sync(&conn, &first).unwrap();

        let second = RemoteSyncState::new(
            branch.project_id.clone(),
            branch.id.clone(),
            "https://example.com/b.git".to_string(),
            "main".to_string(),
        );
        assert!(insert_remote_sync(&conn, &second).is_err());
    }

    #[test]
    fn test_linked_repo_manifest_update() {
        let conn = open_memory_db().unwrap();
        let project = ProjectId::new();
        let repo = LinkedRepo::new(
            project.clone(),
            ProviderKind::GitHub,
            "acme/models".to_string(),
            "main".to_string(),
        );
        insert_linked_repo(&conn, &repo).unwrap();

        update_linked_repo_push(
            &conn,
            &repo.id,
            r#"{"a.bpmn":"h1"}"#,
            "abc123",
            &Utc::now(),
        )
        .unwrap();

        let found = get_linked_repo(&conn, &project).unwrap().unwrap();
        assert_eq!(found.last_pushed_manifest.as_deref(), Some(r#"{"a.bpmn":"h1"}"#));
        assert_eq!(found.last_commit_sha.as_deref(), Some("abc123"));
        assert_eq!(found.provider, ProviderKind::GitHub);
    }

    #[test]
    fn test_second_linked_repo_for_project_is_rejected() {
        let conn = open_memory_db().unwrap();
        let project = ProjectId::new();
        insert_linked_repo(
            &conn,
            &LinkedRepo::new(
                project.clone(),
                ProviderKind::GitHub,
                "acme/one".to_string(),
                "main".to_string(),
            ),
        )
        .unwrap();
        assert!(insert_linked_repo(
            &conn,
            &LinkedRepo::new(
                project,
                ProviderKind::GitHub,
                "acme/two".to_string(),
                "main".to_string(),
            ),
        )
        .is_err());
    }
}
