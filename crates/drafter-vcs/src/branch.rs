use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use rusqlite::Connection;

use drafter_core::error::DrafterError;
use drafter_core::hash;
use drafter_core::models::branch::{draft_name, Branch, BranchId};
use drafter_core::models::commit::{Commit, CommitId};
use drafter_core::models::file::{FileKind, FolderId, WorkingFile, WorkingFolder};
use drafter_core::models::snapshot::{ChangeType, FileSnapshot, SnapshotId};
use drafter_core::models::{ProjectId, UserId};
use drafter_db::{ops, Db};

/// Result of merging a draft back into main.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merge_commit_id: CommitId,
    /// Count of live files on the draft at merge time.
    pub files_changed: usize,
}

/// Owns branch lifecycle: the shared main branch, lazily created per-user
/// drafts, fork-by-copy, merge back to main, and project teardown.
#[derive(Clone)]
pub struct BranchService {
    db: Db,
}

impl BranchService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create the main branch for a project if it does not exist yet.
    /// Idempotent: a second call returns the existing branch untouched.
    pub async fn init_project(&self, project_id: &ProjectId) -> Result<Branch, DrafterError> {
        let conn = self.db.conn().await;
        init_project_inner(&conn, project_id)
    }

    /// Lookup only; `None` means the project was never initialized.
    pub async fn main_branch(&self, project_id: &ProjectId) -> Result<Option<Branch>, DrafterError> {
        let conn = self.db.conn().await;
        ops::get_main_branch(&conn, project_id)
    }

    /// The user's draft branch, created on first use.
    ///
    /// Creation forks from main: the draft starts at main's head and gets a
    /// full copy of main's live files and folders. Legacy rows written with
    /// the `draft/{user}` name but no stored owner are adopted in place
    /// instead of duplicated; when both a legacy and a keyed row exist, the
    /// one that actually carries history wins.
    pub async fn user_branch(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<Branch, DrafterError> {
        let conn = self.db.conn().await;
        let now = Utc::now();
        let name = draft_name(user_id);

        let keyed = ops::get_draft_branch(&conn, project_id, user_id)?;
        let legacy = ops::get_legacy_draft_branch(&conn, project_id, &name)?;

        match (keyed, legacy) {
            (Some(keyed), Some(legacy)) => {
                if keyed.head_commit_id.is_none() && legacy.head_commit_id.is_some() {
                    tracing::info!(
                        branch = %keyed.id,
                        legacy = %legacy.id,
                        "adopting legacy draft history into keyed branch"
                    );
                    ops::update_branch_fork(
                        &conn,
                        &keyed.id,
                        legacy.head_commit_id.as_ref(),
                        legacy.base_commit_id.as_ref(),
                        &now,
                    )?;
                    return ops::get_branch(&conn, &keyed.id)?.ok_or_else(|| {
                        DrafterError::BranchNotFound {
                            id: keyed.id.to_string(),
                        }
                    });
                }
                Ok(keyed)
            }
            (Some(keyed), None) => Ok(keyed),
            (None, Some(legacy)) => {
                tracing::info!(branch = %legacy.id, user = %user_id, "claiming legacy draft branch");
                ops::set_branch_user(&conn, &legacy.id, user_id, &now)?;
                let mut claimed = legacy;
                claimed.user_id = Some(user_id.clone());
                claimed.updated_at = now;
                Ok(claimed)
            }
            (None, None) => {
                let main = init_project_inner(&conn, project_id)?;
                let draft = Branch::draft(
                    project_id.clone(),
                    user_id.clone(),
                    main.head_commit_id.clone(),
                );
                ops::insert_branch(&conn, &draft)?;
                let (files, folders) = copy_branch_files_inner(&conn, &main.id, &draft.id)?;
                tracing::info!(
                    branch = %draft.id,
                    user = %user_id,
                    files,
                    folders,
                    "forked draft branch from main"
                );
                Ok(draft)
            }
        }
    }

    /// Bulk-copy all live files and folders from one branch to another,
    /// with fresh ids and timestamps. Returns `(files, folders)` copied.
    pub async fn copy_branch_files(
        &self,
        source: &BranchId,
        target: &BranchId,
    ) -> Result<(usize, usize), DrafterError> {
        let conn = self.db.conn().await;
        copy_branch_files_inner(&conn, source, target)
    }

    /// Snapshot the branch's live files as a new commit and advance the
    /// branch head. Files absent from the parent commit's set are recorded
    /// as `added`, the rest as `modified`; paths the parent had that are
    /// gone now get `deleted` rows.
    pub async fn commit(
        &self,
        branch_id: &BranchId,
        user_id: &UserId,
        message: &str,
    ) -> Result<Commit, DrafterError> {
        let conn = self.db.conn().await;
        commit_inner(&conn, branch_id, user_id, message, false)
    }

    /// Record the audit commit of a completed remote push. Same snapshot
    /// mechanics as a local commit, but flagged `is_remote` and excluded
    /// from version numbering.
    pub async fn record_remote_commit(
        &self,
        branch_id: &BranchId,
        user_id: &UserId,
        message: &str,
    ) -> Result<Commit, DrafterError> {
        let conn = self.db.conn().await;
        commit_inner(&conn, branch_id, user_id, message, true)
    }

    /// Replace main's file set with the draft's and record a merge commit.
    ///
    /// This is a whole-branch replace, not a three-way merge: it is only
    /// safe under the single-draft-owner workflow, and a concurrent commit
    /// to main between the delete and the copy is silently lost.
    pub async fn merge_to_main(
        &self,
        source_branch_id: &BranchId,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<MergeOutcome, DrafterError> {
        let conn = self.db.conn().await;
        let now = Utc::now();

        let source =
            ops::get_branch(&conn, source_branch_id)?.ok_or_else(|| DrafterError::BranchNotFound {
                id: source_branch_id.to_string(),
            })?;
        let main = ops::get_main_branch(&conn, project_id)?.ok_or_else(|| {
            DrafterError::MainBranchNotFound {
                project: project_id.to_string(),
            }
        })?;

        let files_changed = ops::list_branch_files(&conn, &source.id, false)?.len();

        ops::soft_delete_branch_files(&conn, &main.id, &now)?;
        copy_branch_files_inner(&conn, &source.id, &main.id)?;

        let message = format!("Merge from {}", source.name);
        let merge_commit = commit_inner(&conn, &main.id, user_id, &message, false)?;

        tracing::info!(
            source = %source.id,
            main = %main.id,
            files_changed,
            commit = %merge_commit.id,
            "merged draft into main"
        );

        Ok(MergeOutcome {
            merge_commit_id: merge_commit.id,
            files_changed,
        })
    }

    /// Newest-first history of a branch, walked backward from its head.
    pub async fn commits(
        &self,
        branch_id: &BranchId,
        limit: usize,
    ) -> Result<Vec<Commit>, DrafterError> {
        let conn = self.db.conn().await;
        let branch =
            ops::get_branch(&conn, branch_id)?.ok_or_else(|| DrafterError::BranchNotFound {
                id: branch_id.to_string(),
            })?;

        let mut history = Vec::new();
        let cap = limit.min(crate::MAX_CHAIN_HOPS as usize);
        let mut cursor = branch.head_commit_id;
        while let Some(id) = cursor {
            if history.len() >= cap {
                break;
            }
            match ops::get_commit(&conn, &id)? {
                Some(commit) => {
                    cursor = commit.parent_commit_id.clone();
                    history.push(commit);
                }
                None => break,
            }
        }
        Ok(history)
    }

    /// Best-effort teardown of every version-control row for a project.
    /// Failures are logged and swallowed: teardown must never block the
    /// surrounding project deletion on bookkeeping.
    pub async fn delete_project(&self, project_id: &ProjectId) {
        let conn = self.db.conn().await;

        if let Err(e) = ops::delete_project_snapshots(&conn, project_id) {
            tracing::warn!(project = %project_id, error = %e, "failed to delete snapshots");
        }
        if let Err(e) = ops::delete_project_commits(&conn, project_id) {
            tracing::warn!(project = %project_id, error = %e, "failed to delete commits");
        }
        if let Err(e) = ops::delete_project_pending_changes(&conn, project_id) {
            tracing::warn!(project = %project_id, error = %e, "failed to delete pending changes");
        }
        if let Err(e) = ops::delete_project_files(&conn, project_id) {
            tracing::warn!(project = %project_id, error = %e, "failed to delete working files");
        }
        if let Err(e) = ops::delete_project_folders(&conn, project_id) {
            tracing::warn!(project = %project_id, error = %e, "failed to delete working folders");
        }
        if let Err(e) = ops::delete_project_remote_sync(&conn, project_id) {
            tracing::warn!(project = %project_id, error = %e, "failed to delete remote sync state");
        }
        if let Err(e) = ops::delete_project_linked_repo(&conn, project_id) {
            tracing::warn!(project = %project_id, error = %e, "failed to delete linked repo");
        }
        if let Err(e) = ops::delete_project_branches(&conn, project_id) {
            tracing::warn!(project = %project_id, error = %e, "failed to delete branches");
        }
    }
}

fn init_project_inner(conn: &Connection, project_id: &ProjectId) -> Result<Branch, DrafterError> {
    if let Some(main) = ops::get_main_branch(conn, project_id)? {
        return Ok(main);
    }
    let main = Branch::main(project_id.clone());
    ops::insert_branch(conn, &main)?;
    tracing::info!(project = %project_id, branch = %main.id, "created main branch");
    Ok(main)
}

fn copy_branch_files_inner(
    conn: &Connection,
    source: &BranchId,
    target: &BranchId,
) -> Result<(usize, usize), DrafterError> {
    let folders = ops::list_branch_folders(conn, source, false)?;
    let files = ops::list_branch_files(conn, source, false)?;

    // Copy folders first so file and folder parents can be remapped onto
    // the fresh ids.
    let mut folder_map: HashMap<FolderId, FolderId> = HashMap::new();
    let mut copies: Vec<WorkingFolder> = Vec::with_capacity(folders.len());
    let now = Utc::now();
    for folder in &folders {
        let mut copy = WorkingFolder::new(
            target.clone(),
            folder.project_id.clone(),
            folder.parent_id.clone(),
            folder.name.clone(),
        );
        copy.created_at = now;
        copy.updated_at = now;
        folder_map.insert(folder.id.clone(), copy.id.clone());
        copies.push(copy);
    }
    for copy in &mut copies {
        if let Some(parent) = &copy.parent_id {
            copy.parent_id = folder_map.get(parent).cloned();
        }
        ops::insert_folder(conn, copy)?;
    }

    for file in &files {
        let mut copy = WorkingFile::new(
            target.clone(),
            file.project_id.clone(),
            file.folder_id
                .as_ref()
                .and_then(|f| folder_map.get(f).cloned()),
            file.name.clone(),
            file.kind,
            file.content.clone(),
        );
        copy.created_at = now;
        copy.updated_at = now;
        ops::insert_file(conn, &copy)?;
    }

    Ok((files.len(), copies.len()))
}

type PathKey = (Option<FolderId>, String, FileKind);

fn commit_inner(
    conn: &Connection,
    branch_id: &BranchId,
    user_id: &UserId,
    message: &str,
    is_remote: bool,
) -> Result<Commit, DrafterError> {
    let branch = ops::get_branch(conn, branch_id)?.ok_or_else(|| DrafterError::BranchNotFound {
        id: branch_id.to_string(),
    })?;
    let files = ops::list_branch_files(conn, branch_id, false)?;
    let parent = branch.head_commit_id.clone();

    if files.is_empty() && parent.is_none() {
        return Err(DrafterError::NothingToCommit {
            branch: branch_id.to_string(),
        });
    }

    // The parent commit's live paths, for added/modified/deleted decisions.
    let mut parent_paths: HashSet<PathKey> = HashSet::new();
    let mut parent_snapshots: Vec<FileSnapshot> = Vec::new();
    if let Some(parent_id) = &parent {
        parent_snapshots = ops::snapshots_for_commit(conn, parent_id)?;
        for snap in &parent_snapshots {
            if snap.change_type != ChangeType::Deleted {
                parent_paths.insert((snap.folder_id.clone(), snap.name.clone(), snap.kind));
            }
        }
    }

    let mut tree: BTreeMap<String, String> = BTreeMap::new();
    let mut current_paths: HashSet<PathKey> = HashSet::new();
    let commit_id = CommitId::new();
    let mut snapshots: Vec<FileSnapshot> = Vec::new();

    for file in &files {
        let key: PathKey = (file.folder_id.clone(), file.name.clone(), file.kind);
        let change_type = if parent_paths.contains(&key) {
            ChangeType::Modified
        } else {
            ChangeType::Added
        };
        current_paths.insert(key);

        tree.insert(
            format!(
                "{}:{}:{}",
                file.folder_id
                    .as_ref()
                    .map(|f| f.to_string())
                    .unwrap_or_default(),
                file.name,
                file.kind
            ),
            file.content_hash.clone(),
        );
        snapshots.push(FileSnapshot {
            id: SnapshotId::new(),
            commit_id: commit_id.clone(),
            working_file_id: file.id.clone(),
            folder_id: file.folder_id.clone(),
            name: file.name.clone(),
            kind: file.kind,
            content: Some(file.content.clone()),
            content_hash: Some(file.content_hash.clone()),
            change_type,
        });
    }

    // Paths the parent had that no live file occupies anymore.
    for snap in &parent_snapshots {
        if snap.change_type == ChangeType::Deleted {
            continue;
        }
        let key: PathKey = (snap.folder_id.clone(), snap.name.clone(), snap.kind);
        if !current_paths.contains(&key) {
            snapshots.push(FileSnapshot {
                id: SnapshotId::new(),
                commit_id: commit_id.clone(),
                working_file_id: snap.working_file_id.clone(),
                folder_id: snap.folder_id.clone(),
                name: snap.name.clone(),
                kind: snap.kind,
                content: None,
                content_hash: None,
                change_type: ChangeType::Deleted,
            });
        }
    }

    let version_number = if is_remote {
        None
    } else {
        Some(ops::count_local_branch_commits(conn, branch_id)? + 1)
    };

    let now = Utc::now();
    let commit = Commit {
        id: commit_id,
        project_id: branch.project_id.clone(),
        branch_id: branch_id.clone(),
        parent_commit_id: parent,
        user_id: user_id.clone(),
        message: message.to_string(),
        hash: hash::commit_tree_hash(&tree),
        version_number,
        is_remote,
        created_at: now,
    };

    ops::insert_commit(conn, &commit)?;
    for snap in &snapshots {
        ops::insert_snapshot(conn, snap)?;
    }
    ops::update_branch_head(conn, branch_id, &commit.id, &now)?;

    tracing::info!(
        branch = %branch_id,
        commit = %commit.id,
        snapshots = snapshots.len(),
        is_remote,
        "recorded commit"
    );

    Ok(commit)
}
