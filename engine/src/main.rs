// Boardsync
// Main entry point for the boardsync binary

use clap::Parser;
use boardsync_engine::cli::{Cli, Command};
use boardsync_engine::config::Config;
use boardsync_engine::handlers::{
    handle_capabilities, handle_fingerprint, handle_sync, OutputFormat, SyncArgs,
};
use boardsync_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path)?,
        None => Config::load_or_create()?,
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::debug!("boardsync v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Sync {
            board,
            source,
            transport,
            model,
            execute,
        } => {
            tracing::info!(board = %board, transport = %transport, execute, "Sync requested");
            let args = SyncArgs {
                board,
                source,
                transport,
                model,
                execute,
            };
            handle_sync(args, config, format).await
        }

        Command::Fingerprint { path } => handle_fingerprint(&path, format),

        Command::Capabilities => handle_capabilities(&config, format),
    }
}
