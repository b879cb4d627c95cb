use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("canopy=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Put(args) => commands::put(&cli.file, args).await?,
        Commands::Get(args) => commands::get(&cli.file, args).await?,
        Commands::Ls(args) => commands::ls(&cli.file, args).await?,
        Commands::Watch(args) => commands::watch(&cli.file, args).await?,
    }
    Ok(())
}
