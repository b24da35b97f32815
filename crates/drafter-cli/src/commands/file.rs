use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use uuid::Uuid;

use drafter_core::hash;
use drafter_core::models::branch::Branch;
use drafter_core::models::file::{FileKind, FolderId, WorkingFile};
use drafter_core::models::snapshot::{PendingChange, PendingChangeKind};
use drafter_db::ops;
use drafter_vcs::BranchService;

use super::{Context, ScopeArgs};

#[derive(Subcommand)]
pub enum FileAction {
    /// Create or overwrite a working file from a local file's content
    Put {
        /// File name (without extension)
        name: String,
        /// Path to read the XML content from
        content: PathBuf,
        /// File kind (bpmn, dmn)
        #[arg(long, default_value = "bpmn")]
        kind: String,
        /// Parent folder id
        #[arg(long)]
        folder: Option<Uuid>,
        /// Edit your draft branch instead of main
        #[arg(long)]
        draft: bool,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Soft-delete a working file
    Rm {
        /// File name (without extension)
        name: String,
        /// File kind (bpmn, dmn)
        #[arg(long, default_value = "bpmn")]
        kind: String,
        /// Parent folder id
        #[arg(long)]
        folder: Option<Uuid>,
        /// Edit your draft branch instead of main
        #[arg(long)]
        draft: bool,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// List a branch's working files
    Ls {
        /// List your draft branch instead of main
        #[arg(long)]
        draft: bool,
        /// Include soft-deleted files
        #[arg(long)]
        deleted: bool,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

pub async fn run(action: FileAction) -> anyhow::Result<()> {
    match action {
        FileAction::Put {
            name,
            content,
            kind,
            folder,
            draft,
            scope,
        } => {
            let ctx = Context::open()?;
            let kind: FileKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let content = std::fs::read_to_string(&content)?;
            let folder_id = folder.map(FolderId::from_uuid);

            let branch = resolve_branch(&ctx, &scope, draft).await?;
            let conn = ctx.db.conn().await;

            let existing =
                ops::get_file_at_path(&conn, &branch.id, folder_id.as_ref(), &name, kind)?;
            let journal = match existing {
                Some(file) => {
                    let new_hash = hash::hash_content(&content);
                    ops::update_file_content(&conn, &file.id, &content, &new_hash, &Utc::now())?;
                    println!("Updated {} ({}) on {}", name, kind, branch.name);
                    PendingChange::new(
                        branch.id.clone(),
                        file.id,
                        PendingChangeKind::Update,
                        Some(file.content_hash),
                        Some(new_hash),
                    )
                }
                None => {
                    let file = WorkingFile::new(
                        branch.id.clone(),
                        branch.project_id.clone(),
                        folder_id,
                        name.clone(),
                        kind,
                        content,
                    );
                    ops::insert_file(&conn, &file)?;
                    println!("Created {} ({}) on {}", name, kind, branch.name);
                    PendingChange::new(
                        branch.id.clone(),
                        file.id,
                        PendingChangeKind::Create,
                        None,
                        Some(file.content_hash),
                    )
                }
            };

            // The file write is the primary operation; a failed journal row
            // must not undo it.
            if let Err(e) = ops::insert_pending_change(&conn, &journal) {
                tracing::warn!(branch = %branch.id, error = %e, "failed to journal file edit");
            }
            Ok(())
        }
        FileAction::Rm {
            name,
            kind,
            folder,
            draft,
            scope,
        } => {
            let ctx = Context::open()?;
            let kind: FileKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let folder_id = folder.map(FolderId::from_uuid);

            let branch = resolve_branch(&ctx, &scope, draft).await?;
            let conn = ctx.db.conn().await;

            let file = ops::get_file_at_path(&conn, &branch.id, folder_id.as_ref(), &name, kind)?
                .ok_or_else(|| anyhow::anyhow!("File '{}' ({}) not found on {}", name, kind, branch.name))?;

            ops::soft_delete_file(&conn, &file.id, &Utc::now())?;
            println!("Deleted {} ({}) from {}", name, kind, branch.name);

            let journal = PendingChange::new(
                branch.id.clone(),
                file.id,
                PendingChangeKind::Delete,
                Some(file.content_hash),
                None,
            );
            if let Err(e) = ops::insert_pending_change(&conn, &journal) {
                tracing::warn!(branch = %branch.id, error = %e, "failed to journal file edit");
            }
            Ok(())
        }
        FileAction::Ls {
            draft,
            deleted,
            scope,
        } => {
            let ctx = Context::open()?;
            let branch = resolve_branch(&ctx, &scope, draft).await?;
            let conn = ctx.db.conn().await;
            let files = ops::list_branch_files(&conn, &branch.id, deleted)?;

            if files.is_empty() {
                println!("No files on {}", branch.name);
                return Ok(());
            }

            println!("{:<30} {:<6} {:<10} {}", "NAME", "KIND", "STATE", "UPDATED");
            for file in &files {
                let state = if file.is_deleted { "deleted" } else { "live" };
                println!(
                    "{:<30} {:<6} {:<10} {}",
                    file.name,
                    file.kind,
                    state,
                    file.updated_at.format("%Y-%m-%d %H:%M"),
                );
            }
            Ok(())
        }
    }
}

/// Main branch by default, the caller's draft branch with `--draft`.
/// Either way the branch is created on first use.
async fn resolve_branch(ctx: &Context, scope: &ScopeArgs, draft: bool) -> anyhow::Result<Branch> {
    let project_id = ctx.project_id(scope.project)?;
    let branches = BranchService::new(ctx.db.clone());
    if draft {
        let user_id = ctx.user_id(scope.user)?;
        Ok(branches.user_branch(&project_id, &user_id).await?)
    } else {
        Ok(branches.init_project(&project_id).await?)
    }
}
