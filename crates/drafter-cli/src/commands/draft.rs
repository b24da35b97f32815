use clap::Subcommand;

use drafter_db::ops;
use drafter_vcs::BranchService;

use super::{Context, ScopeArgs};

#[derive(Subcommand)]
pub enum DraftAction {
    /// Show your draft branch, creating it on first use
    Show {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Replace main's files with your draft's and record a merge commit
    Merge {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

pub async fn run(action: DraftAction) -> anyhow::Result<()> {
    match action {
        DraftAction::Show { scope } => {
            let ctx = Context::open()?;
            let project_id = ctx.project_id(scope.project)?;
            let user_id = ctx.user_id(scope.user)?;

            let branches = BranchService::new(ctx.db.clone());
            let branch = branches.user_branch(&project_id, &user_id).await?;

            let conn = ctx.db.conn().await;
            let files = ops::list_branch_files(&conn, &branch.id, false)?;
            let recent = ops::list_pending_changes(&conn, &branch.id, 10)?;

            println!("Branch:  {} ({})", branch.name, branch.id);
            println!(
                "Head:    {}",
                branch
                    .head_commit_id
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
            println!("Files:   {}", files.len());
            if !recent.is_empty() {
                println!("Recent changes:");
                let names: std::collections::HashMap<_, _> = files
                    .iter()
                    .map(|f| (f.id.clone(), f.name.as_str()))
                    .collect();
                for change in &recent {
                    println!(
                        "  {} {:7} {}",
                        change.created_at.format("%Y-%m-%d %H:%M"),
                        change.change_type.to_string(),
                        names
                            .get(&change.working_file_id)
                            .copied()
                            .unwrap_or("(removed)"),
                    );
                }
            }
            Ok(())
        }
        DraftAction::Merge { scope } => {
            let ctx = Context::open()?;
            let project_id = ctx.project_id(scope.project)?;
            let user_id = ctx.user_id(scope.user)?;

            let branches = BranchService::new(ctx.db.clone());
            let branch = branches.user_branch(&project_id, &user_id).await?;
            let outcome = branches
                .merge_to_main(&branch.id, &project_id, &user_id)
                .await?;

            println!(
                "Merged {} file(s) to main (commit {})",
                outcome.files_changed, outcome.merge_commit_id
            );
            Ok(())
        }
    }
}
