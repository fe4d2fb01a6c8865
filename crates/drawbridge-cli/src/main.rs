use std::sync::Arc;

use clap::{Parser, Subcommand};

use drawbridge_core::config::Config;
use drawbridge_relay::Relay;
use drawbridge_server::{run_stdio_surface, start_server, PortNegotiator, ServerState};
use drawbridge_tools::ToolCatalog;

#[derive(Parser)]
#[command(
    name = "drawbridge",
    about = "Relay between a conversational agent and a live design canvas",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Starting control port (the data port binds one below it)
        #[arg(long)]
        port: Option<u16>,

        /// Also expose the tool surface on stdin/stdout
        #[arg(long)]
        stdio: bool,
    },

    /// List the drawing-tool catalog
    Tools,

    /// Query a running instance's health
    Status {
        /// Control port of the running instance
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Logging goes to stderr: with --stdio, stdout carries the tool protocol.
fn init_logging(config: &Config, verbose: bool) {
    let logging = config.logging.clone().unwrap_or_default();

    let mut directives = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".into())
    };
    for filter in &logging.filters {
        directives.push(',');
        directives.push_str(filter);
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    init_logging(&config, cli.verbose);

    let (warnings, errors) = config.validate();
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }

    match cli.command {
        Commands::Serve { port, stdio } => {
            let start_port = port.unwrap_or_else(|| config.start_port());
            let max_port = config.max_port().max(start_port);

            let mut negotiator = PortNegotiator::new(config.bind());
            let listeners = match negotiator.negotiate(start_port, max_port).await {
                Ok(listeners) => listeners,
                Err(e) => {
                    // The only fatal condition: no port pair means no relay.
                    tracing::error!(%e, "Cannot offer a relay");
                    std::process::exit(1);
                }
            };

            let relay = Arc::new(Relay::with_timeout(config.dispatch_timeout()));
            let state = Arc::new(ServerState::new(
                Arc::new(config),
                relay,
                Arc::new(ToolCatalog::new()),
                listeners.binding,
            ));

            if stdio {
                let stdio_state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_stdio_surface(stdio_state).await {
                        tracing::error!(%e, "stdio surface failed");
                    }
                });
            }

            start_server(state, listeners).await?;
        }

        Commands::Tools => {
            let catalog = ToolCatalog::new();
            for spec in catalog.specs() {
                println!("{:<36} {}", spec.name, spec.description);
            }
        }

        Commands::Status { port } => {
            let port = port.unwrap_or_else(|| config.start_port());
            let health: serde_json::Value =
                reqwest::get(format!("http://127.0.0.1:{port}/health"))
                    .await?
                    .json()
                    .await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }

    Ok(())
}
