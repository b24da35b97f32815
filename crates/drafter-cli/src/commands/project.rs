use clap::Subcommand;
use uuid::Uuid;

use drafter_core::models::ProjectId;
use drafter_vcs::BranchService;

use super::Context;

#[derive(Subcommand)]
pub enum ProjectAction {
    /// Create a project's main branch and make it the active project
    Init {
        /// Use a specific project id instead of generating one
        #[arg(long)]
        project: Option<Uuid>,
    },
    /// Delete every stored row for a project
    Destroy {
        /// Project to destroy (defaults to the active project)
        #[arg(long)]
        project: Option<Uuid>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Switch the active project
    Use {
        project: Uuid,
    },
}

pub async fn run(action: ProjectAction) -> anyhow::Result<()> {
    match action {
        ProjectAction::Init { project } => {
            let mut ctx = Context::open()?;
            let project_id = project.map(ProjectId::from_uuid).unwrap_or_else(ProjectId::new);

            let branches = BranchService::new(ctx.db.clone());
            let main = branches.init_project(&project_id).await?;

            ctx.config.active_project = Some(project_id.0);
            ctx.config.save()?;

            println!("Project {} initialized (main branch {})", project_id, main.id);
            println!("Set as the active project");
            Ok(())
        }
        ProjectAction::Destroy { project, yes } => {
            let mut ctx = Context::open()?;
            let project_id = ctx.project_id(project)?;

            if !yes {
                eprint!("Destroy all data for project {project_id}? [y/N] ");
                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;
                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("Aborted");
                    return Ok(());
                }
            }

            let branches = BranchService::new(ctx.db.clone());
            branches.delete_project(&project_id).await;

            if ctx.config.active_project == Some(project_id.0) {
                ctx.config.active_project = None;
                ctx.config.save()?;
            }

            println!("Project {} destroyed", project_id);
            Ok(())
        }
        ProjectAction::Use { project } => {
            let mut ctx = Context::open()?;
            ctx.config.active_project = Some(project);
            ctx.config.save()?;
            println!("Active project set to {project}");
            Ok(())
        }
    }
}
