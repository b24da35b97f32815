use clap::Args;

use drafter_vcs::BranchService;

use super::{Context, ScopeArgs};

#[derive(Args)]
pub struct CommitArgs {
    /// Commit message
    #[arg(short, long)]
    message: String,
    /// Commit your draft branch instead of main
    #[arg(long)]
    draft: bool,
    #[command(flatten)]
    scope: ScopeArgs,
}

pub async fn run(args: CommitArgs) -> anyhow::Result<()> {
    let ctx = Context::open()?;
    let project_id = ctx.project_id(args.scope.project)?;
    let user_id = ctx.user_id(args.scope.user)?;

    let branches = BranchService::new(ctx.db.clone());
    let branch = if args.draft {
        branches.user_branch(&project_id, &user_id).await?
    } else {
        branches.init_project(&project_id).await?
    };

    let commit = branches.commit(&branch.id, &user_id, &args.message).await?;

    match commit.version_number {
        Some(v) => println!("Committed {} as v{} on {}", commit.id, v, branch.name),
        None => println!("Committed {} on {}", commit.id, branch.name),
    }
    Ok(())
}
