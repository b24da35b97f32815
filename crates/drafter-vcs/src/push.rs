use std::collections::HashMap;

use chrono::Utc;

use drafter_core::error::DrafterError;
use drafter_core::models::commit::Commit;
use drafter_core::models::file::{FolderId, WorkingFile, WorkingFolder};
use drafter_core::models::remote::{LinkedRepo, Manifest, ProviderKind};
use drafter_core::models::{ProjectId, UserId};
use drafter_db::{ops, Db};
use drafter_host::{GitProvider, PushFile};

use crate::branch::BranchService;
use crate::diff::SyncService;

/// Outcome of a push attempt. `commit` is `None` when the manifest was
/// unchanged and the remote was never contacted.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub commit: Option<Commit>,
    pub pushed_files: usize,
}

/// One file resolved to its canonical resource path.
#[derive(Debug, Clone)]
struct ManifestEntry {
    path: String,
    hash: String,
    content: String,
}

/// Decides whether a project's current files need pushing to its linked
/// repository, and pushes only when they do.
pub struct PushReconciler {
    db: Db,
    branches: BranchService,
    sync: SyncService,
}

impl PushReconciler {
    pub fn new(db: Db) -> Self {
        Self {
            branches: BranchService::new(db.clone()),
            sync: SyncService::new(db.clone()),
            db,
        }
    }

    /// Link a project to a provider repository and start tracking pushes
    /// to it. Initializes the project's main branch when needed.
    pub async fn connect_repo(
        &self,
        project_id: &ProjectId,
        provider: ProviderKind,
        full_name: &str,
        default_branch: &str,
    ) -> Result<LinkedRepo, DrafterError> {
        let main = self.branches.init_project(project_id).await?;

        let conn = self.db.conn().await;
        let repo = LinkedRepo::new(
            project_id.clone(),
            provider.clone(),
            full_name.to_string(),
            default_branch.to_string(),
        );
        ops::insert_linked_repo(&conn, &repo)?;

        if ops::get_remote_sync(&conn, project_id, &main.id)?.is_none() {
            let state = drafter_core::models::remote::RemoteSyncState::new(
                project_id.clone(),
                main.id.clone(),
                remote_url_for(&provider, full_name),
                default_branch.to_string(),
            );
            ops::insert_remote_sync(&conn, &state)?;
        }

        tracing::info!(project = %project_id, repo = full_name, "linked repository");
        Ok(repo)
    }

    /// Push main's current files to the linked repository if anything
    /// changed since the last push.
    ///
    /// An unchanged manifest returns without any provider call at all.
    /// Otherwise only the files whose path is new or whose hash differs
    /// from the last pushed manifest go out, as one commit; the stored
    /// manifest and commit sha are updated, and a local audit commit
    /// records the push in the project's own history.
    pub async fn push_to_remote(
        &self,
        provider: &dyn GitProvider,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<PushOutcome, DrafterError> {
        // Phase 1: read state and decide, holding the connection.
        let (repo, changed, manifest_json) = {
            let conn = self.db.conn().await;

            let main = ops::get_main_branch(&conn, project_id)?.ok_or_else(|| {
                DrafterError::MainBranchNotFound {
                    project: project_id.to_string(),
                }
            })?;
            let repo = ops::get_linked_repo(&conn, project_id)?.ok_or_else(|| {
                DrafterError::RepoNotLinked {
                    project: project_id.to_string(),
                }
            })?;

            let files = ops::list_branch_files(&conn, &main.id, false)?;
            let folders = ops::list_branch_folders(&conn, &main.id, true)?;
            let entries = manifest_entries(&files, &folders);
            let manifest: Manifest = entries
                .iter()
                .map(|e| (e.path.clone(), e.hash.clone()))
                .collect();
            let manifest_json = serde_json::to_string(&manifest)?;

            if repo.last_pushed_manifest.as_deref() == Some(manifest_json.as_str()) {
                tracing::info!(project = %project_id, "manifest unchanged, skipping push");
                return Ok(PushOutcome {
                    commit: None,
                    pushed_files: 0,
                });
            }
            if entries.is_empty() {
                return Err(DrafterError::NoFilesToPush);
            }

            // A corrupt or absent stored manifest degrades to a full push.
            let previous: Manifest = repo
                .last_pushed_manifest
                .as_deref()
                .and_then(|json| serde_json::from_str(json).ok())
                .unwrap_or_default();
            let changed: Vec<ManifestEntry> = entries
                .into_iter()
                .filter(|e| previous.get(&e.path) != Some(&e.hash))
                .collect();

            if changed.is_empty() {
                // Only removals since the last push. File deletion is not
                // propagated to the remote; record the new manifest so the
                // unchanged gate stays accurate.
                ops::update_linked_repo_manifest(&conn, &repo.id, &manifest_json)?;
                tracing::info!(project = %project_id, "manifest shrank, nothing to push");
                return Ok(PushOutcome {
                    commit: None,
                    pushed_files: 0,
                });
            }

            (repo, changed, manifest_json)
        };

        // Phase 2: network, with the connection released.
        let push_files: Vec<PushFile> = changed
            .iter()
            .map(|e| PushFile {
                path: e.path.clone(),
                content: e.content.clone(),
            })
            .collect();
        let message = format!("Sync {} file(s) from Drafter", push_files.len());
        let receipt = provider
            .push_files(&repo.full_name, &repo.default_branch, &push_files, &message)
            .await?;

        tracing::info!(
            project = %project_id,
            repo = %repo.full_name,
            sha = %receipt.sha,
            files = push_files.len(),
            "pushed to remote"
        );

        // Phase 3: record what landed.
        {
            let conn = self.db.conn().await;
            ops::update_linked_repo_push(&conn, &repo.id, &manifest_json, &receipt.sha, &Utc::now())?;
        }

        let main = self.branches.main_branch(project_id).await?.ok_or_else(|| {
            DrafterError::MainBranchNotFound {
                project: project_id.to_string(),
            }
        })?;
        let audit_message = format!("Pushed to {}", repo.full_name);
        let audit = self
            .branches
            .record_remote_commit(&main.id, user_id, &audit_message)
            .await?;

        // Best effort: a missing sync row only degrades the ahead count.
        if let Err(e) = self.sync.update_last_push_commit(project_id, &audit.id).await {
            tracing::warn!(project = %project_id, error = %e, "failed to update remote sync state");
        }

        Ok(PushOutcome {
            commit: Some(audit),
            pushed_files: push_files.len(),
        })
    }
}

fn remote_url_for(provider: &ProviderKind, full_name: &str) -> String {
    match provider {
        ProviderKind::GitHub => format!("https://github.com/{full_name}.git"),
        ProviderKind::GitLab => format!("https://gitlab.com/{full_name}.git"),
        ProviderKind::Gitea => format!("https://gitea.com/{full_name}.git"),
        ProviderKind::Bitbucket => format!("https://bitbucket.org/{full_name}.git"),
        ProviderKind::AzureDevOps => format!("https://dev.azure.com/{full_name}"),
    }
}

/// Resolve every live file to a canonical repository path.
///
/// Segments come from the folder ancestry walk; each is sanitized, the
/// extension for the file's kind is appended unless already present, and
/// colliding paths get a numeric suffix in stable file-id order.
fn manifest_entries(files: &[WorkingFile], folders: &[WorkingFolder]) -> Vec<ManifestEntry> {
    let folder_index: HashMap<&FolderId, &WorkingFolder> =
        folders.iter().map(|f| (&f.id, f)).collect();

    let mut ordered: Vec<&WorkingFile> = files.iter().collect();
    ordered.sort_by_key(|f| f.id.0);

    let mut taken: HashMap<String, u32> = HashMap::new();
    let mut entries = Vec::with_capacity(ordered.len());
    for file in ordered {
        let mut segments = Vec::new();
        let mut cursor = file.folder_id.as_ref();
        let mut hops = 0;
        while let Some(id) = cursor {
            match folder_index.get(id) {
                Some(folder) => {
                    segments.push(sanitize_segment(&folder.name));
                    cursor = folder.parent_id.as_ref();
                }
                None => break,
            }
            hops += 1;
            if hops >= crate::MAX_CHAIN_HOPS {
                break;
            }
        }
        segments.reverse();

        let extension = file.kind.extension();
        let mut name = sanitize_segment(&file.name);
        if !name.to_lowercase().ends_with(extension) {
            name.push_str(extension);
        }

        let stem_len = name.len() - extension.len();
        segments.push(name.clone());
        let base = segments.join("/");
        let mut path = base.clone();

        // Disambiguate collisions with -2, -3, ... before the extension,
        // skipping suffixes a literally-named file already occupies.
        let mut n = *taken.get(&base).unwrap_or(&1);
        while taken.contains_key(&path) {
            n += 1;
            let last = segments.len() - 1;
            segments[last] = format!("{}-{n}{extension}", &name[..stem_len]);
            path = segments.join("/");
        }
        if n > 1 {
            taken.insert(base, n);
        }
        taken.insert(path.clone(), 1);

        entries.push(ManifestEntry {
            path,
            hash: file.content_hash.clone(),
            content: file.content.clone(),
        });
    }
    entries
}

/// Strip control characters and `<>:"|?*`, then collapse whitespace runs
/// to a single `-`.
fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut in_whitespace = false;
    for c in segment.trim().chars() {
        if c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') {
            continue;
        }
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('-');
            }
            in_whitespace = true;
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use drafter_core::models::branch::Branch;
    use drafter_core::models::file::FileKind;
    use drafter_host::{PushReceipt, TreeEntry};

    use super::*;

    /// Test double that counts provider calls and keeps the last batch.
    #[derive(Default)]
    struct RecordingProvider {
        pushes: AtomicUsize,
        tree_reads: AtomicUsize,
        last_batch: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GitProvider for RecordingProvider {
        async fn validate_credentials(&self) -> Result<bool, DrafterError> {
            Ok(true)
        }

        async fn push_files(
            &self,
            _repo_full_name: &str,
            _branch: &str,
            files: &[PushFile],
            _message: &str,
        ) -> Result<PushReceipt, DrafterError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            *self.last_batch.lock().unwrap() = files.iter().map(|f| f.path.clone()).collect();
            Ok(PushReceipt {
                sha: format!("sha-{}", files.len()),
            })
        }

        async fn get_tree(
            &self,
            _repo_full_name: &str,
            _branch: &str,
        ) -> Result<Vec<TreeEntry>, DrafterError> {
            self.tree_reads.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::GitHub
        }
    }

    async fn seeded_project(db: &Db) -> (PushReconciler, ProjectId, Branch) {
        let reconciler = PushReconciler::new(db.clone());
        let project = ProjectId::new();
        reconciler
            .connect_repo(&project, ProviderKind::GitHub, "acme/models", "main")
            .await
            .unwrap();
        let conn = db.conn().await;
        let main = ops::get_main_branch(&conn, &project).unwrap().unwrap();
        (reconciler, project, main)
    }

    async fn put_file(db: &Db, branch: &Branch, name: &str, kind: FileKind, content: &str) {
        let file = WorkingFile::new(
            branch.id.clone(),
            branch.project_id.clone(),
            None,
            name.to_string(),
            kind,
            content.to_string(),
        );
        let conn = db.conn().await;
        ops::insert_file(&conn, &file).unwrap();
    }

    #[tokio::test]
    async fn test_push_then_unchanged_noop() {
        let db = Db::open_memory().unwrap();
        let (reconciler, project, main) = seeded_project(&db).await;
        let user = UserId::new();
        put_file(&db, &main, "Order flow", FileKind::Bpmn, "<xml/>").await;

        let provider = RecordingProvider::default();
        let first = reconciler
            .push_to_remote(&provider, &project, &user)
            .await
            .unwrap();
        assert_eq!(first.pushed_files, 1);
        let audit = first.commit.unwrap();
        assert!(audit.is_remote);
        assert_eq!(audit.message, "Pushed to acme/models");
        assert_eq!(provider.pushes.load(Ordering::SeqCst), 1);

        // Nothing changed: no provider traffic at all.
        let second = reconciler
            .push_to_remote(&provider, &project, &user)
            .await
            .unwrap();
        assert!(second.commit.is_none());
        assert_eq!(second.pushed_files, 0);
        assert_eq!(provider.pushes.load(Ordering::SeqCst), 1);
        assert_eq!(provider.tree_reads.load(Ordering::SeqCst), 0);

        // After the push the project is synced.
        let sync = SyncService::new(db.clone());
        assert_eq!(sync.sync_status(&project).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_second_push_sends_only_changed_files() {
        let db = Db::open_memory().unwrap();
        let (reconciler, project, main) = seeded_project(&db).await;
        let user = UserId::new();
        put_file(&db, &main, "Stable", FileKind::Bpmn, "<xml v=\"1\"/>").await;
        put_file(&db, &main, "Changed", FileKind::Bpmn, "<xml v=\"1\"/>").await;

        let provider = RecordingProvider::default();
        let first = reconciler
            .push_to_remote(&provider, &project, &user)
            .await
            .unwrap();
        assert_eq!(first.pushed_files, 2);

        {
            let conn = db.conn().await;
            let main = ops::get_main_branch(&conn, &project).unwrap().unwrap();
            let files = ops::list_branch_files(&conn, &main.id, false).unwrap();
            let edited = files.iter().find(|f| f.name == "Changed").unwrap();
            let content = "<xml v=\"2\"/>";
            ops::update_file_content(
                &conn,
                &edited.id,
                content,
                &drafter_core::hash::hash_content(content),
                &Utc::now(),
            )
            .unwrap();
        }

        let second = reconciler
            .push_to_remote(&provider, &project, &user)
            .await
            .unwrap();
        assert_eq!(second.pushed_files, 1);
        assert_eq!(provider.pushes.load(Ordering::SeqCst), 2);
        assert_eq!(*provider.last_batch.lock().unwrap(), vec!["Changed.bpmn"]);
    }

    #[tokio::test]
    async fn test_deletion_only_diff_refreshes_manifest_without_push() {
        let db = Db::open_memory().unwrap();
        let (reconciler, project, main) = seeded_project(&db).await;
        let user = UserId::new();
        put_file(&db, &main, "Kept", FileKind::Bpmn, "<xml/>").await;
        put_file(&db, &main, "Dropped", FileKind::Bpmn, "<xml/>").await;

        let provider = RecordingProvider::default();
        reconciler
            .push_to_remote(&provider, &project, &user)
            .await
            .unwrap();

        {
            let conn = db.conn().await;
            let main = ops::get_main_branch(&conn, &project).unwrap().unwrap();
            let files = ops::list_branch_files(&conn, &main.id, false).unwrap();
            let dropped = files.iter().find(|f| f.name == "Dropped").unwrap();
            ops::soft_delete_file(&conn, &dropped.id, &Utc::now()).unwrap();
        }

        // The remaining file is unchanged: the manifest is refreshed but
        // the provider is not contacted.
        let second = reconciler
            .push_to_remote(&provider, &project, &user)
            .await
            .unwrap();
        assert!(second.commit.is_none());
        assert_eq!(second.pushed_files, 0);
        assert_eq!(provider.pushes.load(Ordering::SeqCst), 1);

        let conn = db.conn().await;
        let repo = ops::get_linked_repo(&conn, &project).unwrap().unwrap();
        let manifest: Manifest =
            serde_json::from_str(repo.last_pushed_manifest.as_deref().unwrap()).unwrap();
        assert!(manifest.contains_key("Kept.bpmn"));
        assert!(!manifest.contains_key("Dropped.bpmn"));
        // The sha of the last real push is preserved.
        assert_eq!(repo.last_commit_sha.as_deref(), Some("sha-2"));
    }

    #[tokio::test]
    async fn test_push_records_manifest_and_sha() {
        let db = Db::open_memory().unwrap();
        let (reconciler, project, main) = seeded_project(&db).await;
        put_file(&db, &main, "Order flow", FileKind::Bpmn, "<xml/>").await;

        let provider = RecordingProvider::default();
        reconciler
            .push_to_remote(&provider, &project, &UserId::new())
            .await
            .unwrap();

        let conn = db.conn().await;
        let repo = ops::get_linked_repo(&conn, &project).unwrap().unwrap();
        assert_eq!(repo.last_commit_sha.as_deref(), Some("sha-1"));
        let manifest: Manifest =
            serde_json::from_str(repo.last_pushed_manifest.as_deref().unwrap()).unwrap();
        assert!(manifest.contains_key("Order-flow.bpmn"));
    }

    #[tokio::test]
    async fn test_empty_project_refuses_push() {
        let db = Db::open_memory().unwrap();
        let (reconciler, project, _main) = seeded_project(&db).await;

        let provider = RecordingProvider::default();
        let result = reconciler
            .push_to_remote(&provider, &project, &UserId::new())
            .await;
        assert!(matches!(result, Err(DrafterError::NoFilesToPush)));
        assert_eq!(provider.pushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unlinked_project_fails() {
        let db = Db::open_memory().unwrap();
        let reconciler = PushReconciler::new(db.clone());
        let project = ProjectId::new();
        BranchService::new(db).init_project(&project).await.unwrap();

        let provider = RecordingProvider::default();
        let result = reconciler
            .push_to_remote(&provider, &project, &UserId::new())
            .await;
        assert!(matches!(result, Err(DrafterError::RepoNotLinked { .. })));
    }

    fn make_file(branch: &Branch, folder: Option<FolderId>, name: &str, kind: FileKind) -> WorkingFile {
        WorkingFile::new(
            branch.id.clone(),
            branch.project_id.clone(),
            folder,
            name.to_string(),
            kind,
            "<xml/>".to_string(),
        )
    }

    #[test]
    fn test_manifest_paths_walk_folder_ancestry() {
        let branch = Branch::main(ProjectId::new());
        let claims = WorkingFolder::new(
            branch.id.clone(),
            branch.project_id.clone(),
            None,
            "Claims: 2024".to_string(),
        );
        let intake = WorkingFolder::new(
            branch.id.clone(),
            branch.project_id.clone(),
            Some(claims.id.clone()),
            "Intake  Forms".to_string(),
        );
        let file = make_file(&branch, Some(intake.id.clone()), "First review?", FileKind::Bpmn);

        let entries = manifest_entries(&[file], &[claims, intake]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "Claims-2024/Intake-Forms/First-review.bpmn");
    }

    #[test]
    fn test_manifest_keeps_existing_extension_casing() {
        let branch = Branch::main(ProjectId::new());
        let file = make_file(&branch, None, "Rates.DMN", FileKind::Dmn);
        let entries = manifest_entries(&[file], &[]);
        assert_eq!(entries[0].path, "Rates.DMN");
    }

    #[test]
    fn test_manifest_disambiguates_colliding_paths() {
        let branch = Branch::main(ProjectId::new());
        let a = make_file(&branch, None, "Order flow", FileKind::Bpmn);
        let b = make_file(&branch, None, "Order  flow", FileKind::Bpmn);
        let c = make_file(&branch, None, "Order\tflow", FileKind::Bpmn);

        let entries = manifest_entries(&[a, b, c], &[]);
        let mut paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["Order-flow-2.bpmn", "Order-flow-3.bpmn", "Order-flow.bpmn"]
        );
    }

    #[test]
    fn test_rename_skips_suffix_held_by_literal_name() {
        let branch = Branch::main(ProjectId::new());
        // The literal "Order flow-2" occupies the path the second
        // "Order flow" would otherwise be renamed to.
        let a = make_file(&branch, None, "Order flow", FileKind::Bpmn);
        let b = make_file(&branch, None, "Order flow-2", FileKind::Bpmn);
        let c = make_file(&branch, None, "Order flow", FileKind::Bpmn);

        let entries = manifest_entries(&[a, b, c], &[]);
        let mut paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
        assert_eq!(
            paths,
            vec!["Order-flow-2.bpmn", "Order-flow-3.bpmn", "Order-flow.bpmn"]
        );
    }

    #[test]
    fn test_sanitize_strips_forbidden_characters() {
        assert_eq!(sanitize_segment("a<b>c:d\"e|f?g*h"), "abcdefgh");
        assert_eq!(sanitize_segment("  spaced   out  "), "spaced-out");
        assert_eq!(sanitize_segment("tab\tand\nnewline"), "tab-and-newline");
    }
}
