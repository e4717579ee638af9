//! CLI entrypoint and subcommand orchestration.

mod config;
mod daemon;
mod demo;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Config;
use gateway::{BackChannelRegistry, ManagementClient, WebsocketAdapter};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level command-line arguments for wsgate.
#[derive(Debug, Parser)]
#[command(name = "wsgate")]
#[command(about = "Local WebSocket bridge for serverless-style handlers", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug logging to ~/.wsgate/logs/
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// CLI subcommands.
#[derive(Debug, Subcommand, PartialEq)]
enum Commands {
    /// Run the WebSocket server (default when no subcommand is given)
    Serve {
        /// Listen address, overriding `server.bind`
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
/// Program entrypoint.
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve { bind: None });

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard = init_tracing(&cli.log_level, cli.debug);

    if cli.debug {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            command = ?command,
            log_level = %cli.log_level,
            "========== wsgate session start =========="
        );
    }

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match command {
        Commands::Serve { bind } => cmd_serve(config, bind).await,
        Commands::Config => cmd_config(&config),
    }
}

/// Console logging filtered by `RUST_LOG` or `--log-level`; with `--debug`,
/// debug-level logs also go to `~/.wsgate/logs/debug.YYYY-MM-DD.log`.
fn init_tracing(
    log_level: &str,
    debug: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if !debug {
        fmt()
            .with_env_filter(console_filter)
            .with_target(false)
            .init();
        return None;
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let log_dir = PathBuf::from(home).join(".wsgate").join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let console = fmt::layer().with_target(false).with_filter(console_filter);
    let file = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false)
        .with_filter(EnvFilter::new("debug,hyper=info,hyper_util=info"));
    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();
    Some(guard)
}

/// Runs the WebSocket server with the built-in reply handler until a shutdown signal.
async fn cmd_serve(config: Config, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let addr = bind.unwrap_or(config.server.bind);
    let registry = BackChannelRegistry::shared();
    let handler = demo::reply_handler(
        ManagementClient::new(Arc::clone(&registry)),
        config.handler.reply.clone(),
    );

    info!(
        addr = %addr,
        ws_path = %config.server.ws_path,
        timeout_secs = config.handler.timeout_secs,
        "Starting wsgate"
    );

    WebsocketAdapter::new(handler, registry)
        .with_handler_timeout(config.handler_timeout())
        .with_ws_path(config.server.ws_path.clone())
        .bind_and_serve(addr, daemon::wait_for_shutdown())
        .await?;

    info!("wsgate stopped");
    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
