use std::sync::Arc;

use clap::Subcommand;
use comfy_table::Table;
use uuid::Uuid;

use drafter_core::models::file::{FileKind, FolderId};
use drafter_core::models::lock::LockId;
use drafter_db::ops;
use drafter_locks::{LockConfig, LockManager, StaticDirectory};
use drafter_vcs::BranchService;

use super::{Context, ScopeArgs};

#[derive(Subcommand)]
pub enum LockAction {
    /// Lock a file on main for exclusive editing
    Acquire {
        /// File name (without extension)
        name: String,
        /// File kind (bpmn, dmn)
        #[arg(long, default_value = "bpmn")]
        kind: String,
        /// Parent folder id
        #[arg(long)]
        folder: Option<Uuid>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Release a held lock
    Release {
        /// Lock id
        lock: Uuid,
    },
    /// List active locks in the project
    Ls {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Release every expired lease now
    Sweep {
        /// Keep sweeping in the background at the configured interval
        #[arg(long)]
        watch: bool,
    },
    /// Release every lock the user holds
    ReleaseAll {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

fn manager(ctx: &Context) -> LockManager {
    LockManager::new(
        ctx.db.clone(),
        LockConfig::from_config(&ctx.config),
        Arc::new(StaticDirectory::new()),
    )
}

pub async fn run(action: LockAction) -> anyhow::Result<()> {
    match action {
        LockAction::Acquire {
            name,
            kind,
            folder,
            scope,
        } => {
            let ctx = Context::open()?;
            let project_id = ctx.project_id(scope.project)?;
            let user_id = ctx.user_id(scope.user)?;
            let kind: FileKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let folder_id = folder.map(FolderId::from_uuid);

            let branches = BranchService::new(ctx.db.clone());
            let main = branches
                .main_branch(&project_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Project {} has no main branch", project_id))?;

            let file = {
                let conn = ctx.db.conn().await;
                ops::get_file_at_path(&conn, &main.id, folder_id.as_ref(), &name, kind)?
            }
            .ok_or_else(|| anyhow::anyhow!("File '{}' ({}) not found on main", name, kind))?;

            let locks = manager(&ctx);
            match locks.acquire(&file.id, &user_id).await? {
                Some(lock) => {
                    println!(
                        "Locked {} until {} (lock {})",
                        name,
                        lock.expires_at.format("%H:%M:%S"),
                        lock.id
                    );
                }
                None => {
                    let holder = locks
                        .holder(&file.id)
                        .await?
                        .map(|h| h.display_name)
                        .unwrap_or_else(|| "another user".to_string());
                    println!("{} is locked by {}", name, holder);
                }
            }
            Ok(())
        }
        LockAction::Release { lock } => {
            let ctx = Context::open()?;
            manager(&ctx).release(&LockId::from_uuid(lock)).await?;
            println!("Lock {} released", lock);
            Ok(())
        }
        LockAction::Ls { scope } => {
            let ctx = Context::open()?;
            let project_id = ctx.project_id(scope.project)?;
            let listed = manager(&ctx).project_locks(&project_id).await?;

            if listed.is_empty() {
                println!("No active locks");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_header(vec!["FILE", "HOLDER", "ACQUIRED", "EXPIRES", "LOCK ID"]);
            for pl in &listed {
                table.add_row(vec![
                    pl.file_name.clone(),
                    pl.holder_name.clone(),
                    pl.lock.acquired_at.format("%H:%M:%S").to_string(),
                    pl.lock.expires_at.format("%H:%M:%S").to_string(),
                    pl.lock.id.to_string(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        LockAction::Sweep { watch } => {
            let ctx = Context::open()?;
            let locks = manager(&ctx);
            let swept = locks.sweep_once().await?;
            println!("Released {} expired lock(s)", swept);
            if watch {
                println!("Sweeping every {:?}, Ctrl-C to stop", locks.config().sweep_interval);
                locks.spawn_sweeper().await?;
            }
            Ok(())
        }
        LockAction::ReleaseAll { scope } => {
            let ctx = Context::open()?;
            let user_id = ctx.user_id(scope.user)?;
            let released = manager(&ctx).release_all_user_locks(&user_id).await?;
            println!("Released {} lock(s)", released);
            Ok(())
        }
    }
}
