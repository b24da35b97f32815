pub mod commit;
pub mod config;
pub mod draft;
pub mod file;
pub mod lock;
pub mod log;
pub mod project;
pub mod push;
pub mod remote;
pub mod status;

use clap::{Args, Subcommand};
use uuid::Uuid;

use drafter_core::config::DrafterConfig;
use drafter_core::models::{ProjectId, UserId};
use drafter_db::Db;

#[derive(Subcommand)]
pub enum Command {
    /// Initialize and manage Drafter configuration
    Config {
        #[command(subcommand)]
        action: config::ConfigAction,
    },
    /// Create and tear down projects
    Project {
        #[command(subcommand)]
        action: project::ProjectAction,
    },
    /// Edit and list working files
    File {
        #[command(subcommand)]
        action: file::FileAction,
    },
    /// Work with your personal draft branch
    Draft {
        #[command(subcommand)]
        action: draft::DraftAction,
    },
    /// Snapshot a branch's files as a commit
    Commit(commit::CommitArgs),
    /// Show uncommitted changes and remote sync state
    Status(status::StatusArgs),
    /// Show commit history
    Log(log::LogArgs),
    /// Acquire, release and inspect file locks
    Lock {
        #[command(subcommand)]
        action: lock::LockAction,
    },
    /// Link a git repository to the project
    Remote {
        #[command(subcommand)]
        action: remote::RemoteAction,
    },
    /// Push main's files to the linked repository
    Push(push::PushArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Config { action } => config::run(action),
        Command::Project { action } => project::run(action).await,
        Command::File { action } => file::run(action).await,
        Command::Draft { action } => draft::run(action).await,
        Command::Commit(args) => commit::run(args).await,
        Command::Status(args) => status::run(args).await,
        Command::Log(args) => log::run(args).await,
        Command::Lock { action } => lock::run(action).await,
        Command::Remote { action } => remote::run(action).await,
        Command::Push(args) => push::run(args).await,
    }
}

/// Project/user selection shared by every command that touches a project.
#[derive(Args)]
pub struct ScopeArgs {
    /// Project to operate on (defaults to the active project)
    #[arg(long)]
    pub project: Option<Uuid>,
    /// User to act as (defaults to the active user)
    #[arg(long)]
    pub user: Option<Uuid>,
}

/// Loaded config plus an open database handle.
pub struct Context {
    pub config: DrafterConfig,
    pub db: Db,
}

impl Context {
    pub fn open() -> anyhow::Result<Self> {
        let config = DrafterConfig::load()?;
        let db = Db::open(&DrafterConfig::db_path()?)?;
        Ok(Self { config, db })
    }

    pub fn project_id(&self, over: Option<Uuid>) -> anyhow::Result<ProjectId> {
        over.or(self.config.active_project)
            .map(ProjectId::from_uuid)
            .ok_or_else(|| {
                anyhow::anyhow!("No project selected. Pass --project or run `drafter project init`")
            })
    }

    pub fn user_id(&self, over: Option<Uuid>) -> anyhow::Result<UserId> {
        over.or(self.config.active_user)
            .map(UserId::from_uuid)
            .ok_or_else(|| {
                anyhow::anyhow!("No user selected. Pass --user or set active_user in the config")
            })
    }
}
