mod config_commands;
mod demo_commands;

use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    missive_config::MediatorConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "missive", about = "Missive: in-process request/response mediator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./missive.* and ~/.config/missive/).
    #[arg(long, global = true, env = "MISSIVE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demo scenario over the in-memory transport.
    Demo {
        #[arg(value_enum, default_value_t)]
        scenario: demo_commands::Scenario,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// The config at `path`, or the discovered one.
fn load(path: Option<&Path>) -> anyhow::Result<MediatorConfig> {
    match path {
        Some(path) => missive_config::load_config(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(missive_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "missive starting");

    match cli.command {
        Commands::Demo { scenario } => {
            let config = load(cli.config.as_deref())?;
            demo_commands::run(scenario, &config).await
        },
        Commands::Config { action } => config_commands::handle_config(action, cli.config.as_deref()),
    }
}
