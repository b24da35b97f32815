use std::collections::{HashMap, HashSet};

use chrono::Utc;

use drafter_core::error::DrafterError;
use drafter_core::hash;
use drafter_core::models::branch::BranchId;
use drafter_core::models::commit::CommitId;
use drafter_core::models::file::{FileId, FileKind, FolderId, WorkingFolder};
use drafter_core::models::remote::RemoteSyncState;
use drafter_core::models::snapshot::ChangeType;
use drafter_core::models::ProjectId;
use drafter_db::{ops, Db};

/// Files and folders on main that differ from the baseline commit.
#[derive(Debug, Clone, Default)]
pub struct DirtySet {
    pub file_ids: Vec<FileId>,
    pub folder_ids: Vec<FolderId>,
}

/// Knobs for [`SyncService::uncommitted_ids`].
#[derive(Debug, Clone)]
pub struct DirtySetOptions {
    /// Diff against this commit instead of main's head.
    pub baseline_commit_id: Option<CommitId>,
    /// With no baseline at all, report every file as dirty (the default)
    /// rather than nothing.
    pub treat_no_baseline_as_all: bool,
}

impl Default for DirtySetOptions {
    fn default() -> Self {
        Self {
            baseline_commit_id: None,
            treat_no_baseline_as_all: true,
        }
    }
}

/// Computes how far main is ahead of the last push and which working
/// files differ from the last commit.
#[derive(Clone)]
pub struct SyncService {
    db: Db,
}

impl SyncService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// How many commits main is ahead of the remote baseline.
    ///
    /// `None` means there is nothing to count: no main branch, no commits
    /// yet, or no remote configured. When a remote exists but nothing was
    /// ever pushed, the whole chain counts as ahead. The walk stops at
    /// 1000 hops, returning a truncated count for pathological chains.
    pub async fn sync_status(&self, project_id: &ProjectId) -> Result<Option<u32>, DrafterError> {
        let conn = self.db.conn().await;

        let main = match ops::get_main_branch(&conn, project_id)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let head = match &main.head_commit_id {
            Some(h) => h.clone(),
            None => return Ok(None),
        };
        let sync = match ops::get_remote_sync(&conn, project_id, &main.id)? {
            Some(s) => s,
            None => return Ok(None),
        };

        let last_push = match &sync.last_push_commit_id {
            Some(c) => c.clone(),
            None => return Ok(Some(ops::count_branch_commits(&conn, &main.id)?)),
        };

        let mut hops = 0u32;
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            if id == last_push || hops >= crate::MAX_CHAIN_HOPS {
                break;
            }
            hops += 1;
            cursor = ops::get_commit(&conn, &id)?.and_then(|c| c.parent_commit_id);
        }
        Ok(Some(hops))
    }

    /// Record that `commit_id` was pushed: the remote row flips to
    /// `synced` with a fresh push timestamp.
    pub async fn update_last_push_commit(
        &self,
        project_id: &ProjectId,
        commit_id: &CommitId,
    ) -> Result<(), DrafterError> {
        let conn = self.db.conn().await;
        let main = ops::get_main_branch(&conn, project_id)?.ok_or_else(|| {
            DrafterError::MainBranchNotFound {
                project: project_id.to_string(),
            }
        })?;
        let sync = ops::get_remote_sync(&conn, project_id, &main.id)?.ok_or_else(|| {
            DrafterError::RemoteNotConfigured {
                project: project_id.to_string(),
            }
        })?;
        ops::update_last_push(&conn, &sync.id, commit_id, &Utc::now())
    }

    /// The dirty-detection algorithm over main's worktree.
    ///
    /// Identity is path plus kind, never the working-file id: a file
    /// deleted and recreated at the same path still diffs correctly
    /// against history. The baseline snapshot index maps each path to the
    /// *set* of hashes ever recorded there in that commit, tolerating
    /// multiple snapshots landing on one logical path across rewrites.
    pub async fn uncommitted_ids(
        &self,
        project_id: &ProjectId,
        opts: DirtySetOptions,
    ) -> Result<DirtySet, DrafterError> {
        let conn = self.db.conn().await;

        let main = match ops::get_main_branch(&conn, project_id)? {
            Some(b) => b,
            None => return Ok(DirtySet::default()),
        };
        let files = ops::list_branch_files(&conn, &main.id, false)?;
        let folders = ops::list_branch_folders(&conn, &main.id, true)?;
        let folder_index: HashMap<FolderId, WorkingFolder> =
            folders.into_iter().map(|f| (f.id.clone(), f)).collect();

        let baseline = opts
            .baseline_commit_id
            .clone()
            .or_else(|| main.head_commit_id.clone());

        let baseline = match baseline {
            Some(b) => b,
            None => {
                if !opts.treat_no_baseline_as_all {
                    return Ok(DirtySet::default());
                }
                let mut dirty_folders: HashSet<FolderId> = HashSet::new();
                for file in &files {
                    collect_ancestors(&folder_index, file.folder_id.as_ref(), &mut dirty_folders);
                }
                return Ok(DirtySet {
                    file_ids: files.into_iter().map(|f| f.id).collect(),
                    folder_ids: dirty_folders.into_iter().collect(),
                });
            }
        };

        // Baseline path -> set of historically valid content hashes.
        let mut baseline_hashes: HashMap<(Option<FolderId>, String, FileKind), HashSet<String>> =
            HashMap::new();
        for snap in ops::snapshots_for_commit(&conn, &baseline)? {
            if snap.change_type == ChangeType::Deleted {
                continue;
            }
            if let Some(h) = snap.content_hash {
                baseline_hashes
                    .entry((snap.folder_id, snap.name, snap.kind))
                    .or_default()
                    .insert(h);
            }
        }

        let mut file_ids = Vec::new();
        let mut dirty_folders: HashSet<FolderId> = HashSet::new();
        for file in &files {
            let current = hash::hash_content(&file.content);
            let key = (file.folder_id.clone(), file.name.clone(), file.kind);
            let clean = baseline_hashes
                .get(&key)
                .map(|hashes| hashes.contains(&current))
                .unwrap_or(false);
            if !clean {
                file_ids.push(file.id.clone());
                collect_ancestors(&folder_index, file.folder_id.as_ref(), &mut dirty_folders);
            }
        }

        Ok(DirtySet {
            file_ids,
            folder_ids: dirty_folders.into_iter().collect(),
        })
    }

    pub async fn has_uncommitted_changes(
        &self,
        project_id: &ProjectId,
    ) -> Result<bool, DrafterError> {
        let dirty = self
            .uncommitted_ids(project_id, DirtySetOptions::default())
            .await?;
        Ok(!dirty.file_ids.is_empty())
    }

    /// Start tracking a remote for a branch.
    pub async fn setup_remote_sync(
        &self,
        project_id: &ProjectId,
        branch_id: &BranchId,
        remote_url: &str,
        remote_branch: &str,
    ) -> Result<RemoteSyncState, DrafterError> {
        let conn = self.db.conn().await;
        let state = RemoteSyncState::new(
            project_id.clone(),
            branch_id.clone(),
            remote_url.to_string(),
            remote_branch.to_string(),
        );
        ops::insert_remote_sync(&conn, &state)?;
        Ok(state)
    }

    /// The remote-sync row tracked for main, if any.
    pub async fn remote_sync_state(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<RemoteSyncState>, DrafterError> {
        let conn = self.db.conn().await;
        let main = match ops::get_main_branch(&conn, project_id)? {
            Some(b) => b,
            None => return Ok(None),
        };
        ops::get_remote_sync(&conn, project_id, &main.id)
    }
}

/// Every ancestor folder of `start`, walked through the parent chain.
/// A visited set guards against parent cycles in corrupted data.
fn collect_ancestors(
    folders: &HashMap<FolderId, WorkingFolder>,
    start: Option<&FolderId>,
    out: &mut HashSet<FolderId>,
) {
    let mut cursor = start.cloned();
    while let Some(id) = cursor {
        if !out.insert(id.clone()) {
            break;
        }
        cursor = folders.get(&id).and_then(|f| f.parent_id.clone());
    }
}
