mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "drafter", version, about = "Versioned process-model storage with file locking and git push")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::run(cli.command).await
}
