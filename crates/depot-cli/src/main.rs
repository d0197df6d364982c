//! depot - select, fetch and store verified implementations

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use depot_cli::cmd::{self, Context};
use depot_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins unless -v was given
    let filter = if cli.verbose > 0 {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::new(&cli)?;
    match &cli.command {
        Commands::Select(args) => cmd::select::select(&ctx, args).await,
        Commands::Download(args) => cmd::download::download(&ctx, args).await,
        Commands::Store { command } => cmd::store::run(&ctx, command),
    }
}
