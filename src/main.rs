mod cli;
mod commands;
mod monitor;

use clap::Parser;
use cli::{Cli, Commands};
use paceguard::config::Config;

fn main() -> anyhow::Result<()> {
    // Initialize logging on stderr so stdout carries only status output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("paceguard=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor { input, fast, json } => {
            let config = Config::load(cli.config.as_deref())?;
            tracing::info!("Starting paceguard monitor");
            crate::monitor::run_monitor(config, &input, fast, json)
        }
        Commands::Analyze { input, json } => {
            let config = Config::load(cli.config.as_deref())?;
            crate::commands::analyze(&config, &input, json)
        }
        Commands::InitConfig { path, force } => {
            crate::commands::init_config(path.as_deref(), force)
        }
        Commands::ShowConfig => {
            let (config, resolved) = Config::load_with_path(cli.config.as_deref())?;
            crate::commands::show_config(&config, resolved.as_deref())
        }
    }
}
