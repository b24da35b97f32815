use clap::Subcommand;
use drafter_core::config::DrafterConfig;
use drafter_db::Db;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Initialize ~/.drafter/ with default config and database
    Init,
    /// Show current configuration
    Show,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let home = DrafterConfig::init()?;
            let db_path = DrafterConfig::db_path()?;

            // Ensure the database exists with the schema applied
            Db::open(&db_path)?;

            println!("Initialized drafter at {}", home.display());
            println!("  config: {}", DrafterConfig::config_path()?.display());
            println!("  database: {}", db_path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = DrafterConfig::load()?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{toml_str}");
            Ok(())
        }
    }
}
