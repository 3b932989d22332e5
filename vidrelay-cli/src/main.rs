//! vidrelay CLI - Command-line interface
//!
//! Runs the relay server or drives single pipeline stages from a shell.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use vidrelay_core::selection::SelectionPolicy;
use vidrelay_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "vidrelay")]
#[command(about = "A video relay: proxy lookups and stream downloads")]
#[command(version)]
struct Cli {
    /// Console log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full debug log of this run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    /// Encoding selection policy: highest, lowest-bandwidth or prefer:<container>
    #[arg(long, global = true)]
    policy: Option<SelectionPolicy>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    commands::handle_command(cli.command, cli.policy).await
}
