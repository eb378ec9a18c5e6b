//! chatmirror - mirror an IDE's AI chat panel to remote viewers
//!
//! Main entry point for the chatmirror CLI and relay server.

mod cli;
mod commands;
mod server;

use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (mut config, report) = server::load_config(cli.config.as_deref())?;
    server::init_tracing(&config.logging)?;
    server::report_warnings(&report);

    match cli.command {
        None => server::run_server(config).await,
        Some(Commands::Run { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            server::run_server(config).await
        }
        Some(Commands::Targets { port }) => commands::targets(&config, port).await,
        Some(Commands::Snapshot { port }) => commands::snapshot(&config, port).await,
        Some(Commands::Slots) => commands::slots(&config).await,
    }
}
