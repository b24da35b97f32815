use clap::Subcommand;

use drafter_core::models::remote::ProviderKind;
use drafter_creds::{repo_key, CredentialStore, KeyringStore};
use drafter_db::ops;
use drafter_host::create_provider;
use drafter_vcs::{PushReconciler, SyncService};

use super::{Context, ScopeArgs};

#[derive(Subcommand)]
pub enum RemoteAction {
    /// Link a git repository to the project
    Connect {
        /// Repository in owner/repo form
        full_name: String,
        /// Provider type (github, gitlab, gitea, bitbucket, azure_devops)
        #[arg(long, default_value = "github")]
        provider: String,
        /// Branch pushes land on
        #[arg(long, default_value = "main")]
        branch: String,
        /// API token (will prompt if not provided)
        #[arg(long)]
        token: Option<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Show the linked repository and push state
    Show {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

pub async fn run(action: RemoteAction) -> anyhow::Result<()> {
    match action {
        RemoteAction::Connect {
            full_name,
            provider,
            branch,
            token,
            scope,
        } => {
            let ctx = Context::open()?;
            let project_id = ctx.project_id(scope.project)?;

            let kind: ProviderKind = provider.parse().map_err(|e: String| anyhow::anyhow!(e))?;

            if {
                let conn = ctx.db.conn().await;
                ops::get_linked_repo(&conn, &project_id)?.is_some()
            } {
                anyhow::bail!("Project {} already has a linked repository", project_id);
            }

            let token = match token {
                Some(t) => t,
                None => {
                    eprint!("Enter API token for {full_name}: ");
                    let mut input = String::new();
                    std::io::stdin().read_line(&mut input)?;
                    input.trim().to_string()
                }
            };
            if token.is_empty() {
                anyhow::bail!("Token cannot be empty");
            }

            let adapter = create_provider(&kind, &kind.default_api_url(), &token)?;
            if !adapter.validate_credentials().await? {
                anyhow::bail!("Credentials for {} are invalid", full_name);
            }

            let key = repo_key(&kind, &full_name);
            KeyringStore::new().store(&key, &token)?;

            let reconciler = PushReconciler::new(ctx.db.clone());
            let repo = reconciler
                .connect_repo(&project_id, kind, &full_name, &branch)
                .await?;

            println!("Linked {} ({}) to project {}", repo.full_name, repo.provider, project_id);
            println!("Token stored in OS keychain as '{}'", key);
            Ok(())
        }
        RemoteAction::Show { scope } => {
            let ctx = Context::open()?;
            let project_id = ctx.project_id(scope.project)?;

            let repo = {
                let conn = ctx.db.conn().await;
                ops::get_linked_repo(&conn, &project_id)?
            }
            .ok_or_else(|| anyhow::anyhow!("Project {} has no linked repository", project_id))?;

            println!("Repository:  {} ({})", repo.full_name, repo.provider);
            println!("Branch:      {}", repo.default_branch);
            println!(
                "Last push:   {}",
                repo.last_push_at
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
            println!(
                "Last commit: {}",
                repo.last_commit_sha.as_deref().unwrap_or("—")
            );

            let sync = SyncService::new(ctx.db.clone());
            if let Some(state) = sync.remote_sync_state(&project_id).await? {
                println!("Remote URL:  {}", state.remote_url);
                println!("Status:      {}", state.sync_status);
            }
            Ok(())
        }
    }
}
