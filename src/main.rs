use anyhow::Result;
use clap::Parser;
use composebox::cli::StackAction;
use composebox::infra::config::DEFAULT_CONFIG_NAME;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "composebox",
    about = "Compose stack lifecycle for automated test runs"
)]
struct Cli {
    /// Stack definition file
    #[arg(long, env = "COMPOSEBOX_CONFIG", default_value = DEFAULT_CONFIG_NAME)]
    config: PathBuf,

    /// Handoff record location (also read by test code)
    #[arg(long, env = "COMPOSEBOX_STATE_FILE")]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: StackAction,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    composebox::cli::stack::run(cli.command, &cli.config, cli.state_file)
}
