//! LogView Daemon
//!
//! Read-only, access-controlled log file service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use logview::config::Config;
use logview::http::{self, AppState};
use logview::FileService;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// LogView - read-only, access-controlled log file service.
#[derive(Parser, Debug)]
#[command(name = "logview")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server
    Serve,

    /// Load and validate the configuration, then print a summary
    Check,

    /// Show which groups grant a user access
    Access {
        /// Username to check
        #[arg(long, short)]
        user: String,

        /// Path relative to the served root; omit to list all memberships
        #[arg(long, short)]
        path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Initialize tracing
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    // Validate configuration
    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);

    match cli.command {
        Commands::Serve => run_server(config).await?,
        Commands::Check => {
            let service = FileService::new(config)?;
            print_summary(&service);
        }
        Commands::Access { user, path } => {
            let service = FileService::new(config)?;
            let groups = match &path {
                Some(path) => service.resolve_accessible_groups(&user, path)?,
                None => service.user_groups(&user),
            };

            match (&path, groups.is_empty()) {
                (Some(path), true) => println!("{} has no access to {}", user, path),
                (None, true) => println!("{} is not a member of any group", user),
                (_, false) => {
                    for group in groups {
                        println!("{}", group);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("LogView daemon starting...");

    let shutdown = CancellationToken::new();
    let state = AppState::new(config, shutdown.clone())?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            tracing::error!("Failed to listen for shutdown signals: {}", e);
        }
        signal_token.cancel();
    });

    http::serve(state).await
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, shutting down");
        }
    }
    Ok(())
}

fn print_summary(service: &FileService) {
    let config = service.config();
    println!("Configuration OK");
    println!("  root:         {}", service.root().display());
    println!("  listen:       {}", config.server.bind_address());
    println!("  auth header:  {}", config.server.auth_header);
    println!("  match mode:   {:?}", config.access.match_mode);
    println!(
        "  page size:    {} (max {})",
        config.limits.default_page_size, config.limits.max_page_size
    );
    println!("  max file:     {} bytes", config.limits.max_file_size);
    println!("  tail poll:    {} ms", config.limits.tail_check_interval_ms);
    println!("  groups:       {}", config.groups.len());
    for group in service.policy().groups() {
        println!(
            "    {:<16} {:<32} {} member(s)",
            group.name(),
            group.pattern(),
            group.members().len()
        );
    }
}
