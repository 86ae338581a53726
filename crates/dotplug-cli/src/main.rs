//! dot - concurrent declarative installer CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dotplug_cli::cmd;
use dotplug_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with the progress table.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install(args) => cmd::install::install(args).await,
        Commands::Check { manifest } => cmd::check::check(&manifest).await,
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
