use clap::Args;

use drafter_vcs::BranchService;

use super::{Context, ScopeArgs};

#[derive(Args)]
pub struct LogArgs {
    /// Number of commits to show
    #[arg(long, default_value = "20")]
    limit: usize,
    /// Show your draft branch's history instead of main's
    #[arg(long)]
    draft: bool,
    #[command(flatten)]
    scope: ScopeArgs,
}

pub async fn run(args: LogArgs) -> anyhow::Result<()> {
    let ctx = Context::open()?;
    let project_id = ctx.project_id(args.scope.project)?;

    let branches = BranchService::new(ctx.db.clone());
    let branch = if args.draft {
        let user_id = ctx.user_id(args.scope.user)?;
        branches.user_branch(&project_id, &user_id).await?
    } else {
        branches
            .main_branch(&project_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Project {} has no main branch", project_id))?
    };

    let commits = branches.commits(&branch.id, args.limit).await?;
    if commits.is_empty() {
        println!("No commits on {}", branch.name);
        return Ok(());
    }

    println!("{:<20} {:<8} {:<8} {}", "CREATED", "VERSION", "KIND", "MESSAGE");
    for commit in &commits {
        let version = commit
            .version_number
            .map(|v| format!("v{v}"))
            .unwrap_or_else(|| "—".to_string());
        let kind = if commit.is_remote { "remote" } else { "local" };
        println!(
            "{:<20} {:<8} {:<8} {}",
            commit.created_at.format("%Y-%m-%d %H:%M:%S"),
            version,
            kind,
            commit.message,
        );
    }
    Ok(())
}
