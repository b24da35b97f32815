use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use drafter_creds::{token_for_repo, KeyringStore};
use drafter_db::ops;
use drafter_host::create_provider;
use drafter_vcs::PushReconciler;

use super::{Context, ScopeArgs};

#[derive(Args)]
pub struct PushArgs {
    #[command(flatten)]
    scope: ScopeArgs,
}

pub async fn run(args: PushArgs) -> anyhow::Result<()> {
    let ctx = Context::open()?;
    let project_id = ctx.project_id(args.scope.project)?;
    let user_id = ctx.user_id(args.scope.user)?;

    let repo = {
        let conn = ctx.db.conn().await;
        ops::get_linked_repo(&conn, &project_id)?
    }
    .ok_or_else(|| {
        anyhow::anyhow!("Project {} has no linked repository. Run `drafter remote connect`", project_id)
    })?;

    let store = KeyringStore::new();
    let token = token_for_repo(&store, &repo.provider, &repo.full_name)?.ok_or_else(|| {
        anyhow::anyhow!("No token found in keychain for {}", repo.full_name)
    })?;
    let provider = create_provider(&repo.provider, &repo.provider.default_api_url(), &token)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(format!("pushing to {}", repo.full_name));

    let reconciler = PushReconciler::new(ctx.db.clone());
    let outcome = reconciler
        .push_to_remote(provider.as_ref(), &project_id, &user_id)
        .await;

    match outcome {
        Ok(outcome) => {
            if outcome.commit.is_some() {
                pb.finish_with_message(format!(
                    "pushed {} file(s) to {}",
                    outcome.pushed_files, repo.full_name
                ));
            } else {
                pb.finish_with_message(format!("{} is up to date", repo.full_name));
            }
            Ok(())
        }
        Err(e) => {
            pb.finish_with_message("push failed");
            Err(e.into())
        }
    }
}
