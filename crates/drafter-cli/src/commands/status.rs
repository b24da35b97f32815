use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use clap::Args;
use comfy_table::{Cell, Color, Table};

use drafter_core::models::file::FileId;
use drafter_db::ops;
use drafter_locks::{LockConfig, LockManager, StaticDirectory};
use drafter_vcs::{BranchService, DirtySetOptions, SyncService};

use super::{Context, ScopeArgs};

#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    scope: ScopeArgs,
}

pub async fn run(args: StatusArgs) -> anyhow::Result<()> {
    let ctx = Context::open()?;
    let project_id = ctx.project_id(args.scope.project)?;

    let branches = BranchService::new(ctx.db.clone());
    let sync = SyncService::new(ctx.db.clone());
    let locks = LockManager::new(
        ctx.db.clone(),
        LockConfig::from_config(&ctx.config),
        Arc::new(StaticDirectory::new()),
    );

    let main = match branches.main_branch(&project_id).await? {
        Some(b) => b,
        None => {
            println!("Project {} has no main branch. Run `drafter project init`.", project_id);
            return Ok(());
        }
    };

    let dirty = sync
        .uncommitted_ids(&project_id, DirtySetOptions::default())
        .await?;
    let dirty_files: HashSet<&FileId> = dirty.file_ids.iter().collect();

    let held: HashMap<FileId, String> = locks
        .project_locks(&project_id)
        .await?
        .into_iter()
        .map(|pl| (pl.lock.file_id.clone(), pl.holder_name))
        .collect();

    let files = {
        let conn = ctx.db.conn().await;
        ops::list_branch_files(&conn, &main.id, false)?
    };

    let mut table = Table::new();
    table.set_header(vec!["FILE", "KIND", "STATE", "LOCKED BY", "UPDATED"]);
    for file in &files {
        let (state, color) = if dirty_files.contains(&file.id) {
            ("modified", Color::Yellow)
        } else {
            ("clean", Color::Green)
        };
        table.add_row(vec![
            Cell::new(&file.name),
            Cell::new(file.kind.to_string()),
            Cell::new(state).fg(color),
            Cell::new(held.get(&file.id).map(String::as_str).unwrap_or("—")),
            Cell::new(file.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    println!("{table}");

    let sync_line = match sync.sync_status(&project_id).await? {
        Some(0) => "in sync with remote".to_string(),
        Some(n) => format!("{n} commit(s) ahead of last push"),
        None => "no remote tracking".to_string(),
    };
    println!(
        "Summary: {} modified file(s) | {} folder(s) touched | {} lock(s) held | {}",
        dirty.file_ids.len(),
        dirty.folder_ids.len(),
        held.len(),
        sync_line
    );

    Ok(())
}
