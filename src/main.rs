//! Main entry point for the Arena Lobby service
//!
//! Production entry point: loads configuration, initializes logging, starts
//! the orchestration engine, and shuts down gracefully on SIGINT/SIGTERM.

use anyhow::Result;
use arena_lobby::config::AppConfig;
use arena_lobby::service::AppState;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// Arena Lobby - matchmaking and match orchestration for an online auto-battler
#[derive(Parser)]
#[command(
    name = "arena-lobby",
    version,
    about = "Lobby and match orchestration engine for an online auto-battler",
    long_about = "Arena Lobby runs the server-side match lifecycle: a rating-bucketed \
                 matchmaking queue with bot backfill, room state machines, hero selection \
                 with deadlines, and the phase scheduler that drives each game from \
                 preparation through combat to a winner. Events go out over AMQP."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// AMQP URL override
    #[arg(long, value_name = "URL", help = "Override AMQP connection URL")]
    amqp_url: Option<String>,

    /// Health port override
    #[arg(long, value_name = "PORT", help = "Override health server port")]
    health_port: Option<u16>,

    /// Disable bot backfill
    #[arg(long, help = "Disable automatic bot backfill for lone players")]
    no_bot_backfill: bool,

    /// Run without an AMQP broker; events are dropped
    #[arg(long, help = "Run without a broker connection (events are dropped)")]
    standalone: bool,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Perform a one-shot health check and return an exit-code-bearing result
async fn perform_health_check(config: AppConfig, standalone: bool) -> Result<()> {
    info!("Performing health check...");

    let mut app_state = if standalone {
        AppState::standalone(config)?
    } else {
        AppState::new(config).await?
    };
    app_state.start().await?;

    let health = app_state.health_state().check().await;
    println!("Health Check: {}", health.status);
    println!("  Players Waiting: {}", health.stats.players_waiting);
    println!("  Active Rooms: {}", health.stats.active_rooms);
    println!("  Rooms Formed: {}", health.stats.rooms_formed);
    for check in &health.checks {
        match &check.message {
            Some(msg) => println!("  [{}] {}: {}", check.status, check.name, msg),
            None => println!("  [{}] {}", check.status, check.name),
        }
    }

    let status = health.status;
    app_state.shutdown().await;

    if status == arena_lobby::service::HealthStatus::Healthy {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Arena Lobby Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!("   AMQP: {}", config.amqp.url);
    info!("   Room size: {}", config.rules.room_size);
    info!(
        "   Bot backfill: {} ({}s threshold)",
        config.matchmaking.enable_bot_backfill, config.matchmaking.backfill_delay_seconds
    );
    info!(
        "   Rating bucket width: {}",
        config.matchmaking.rating_bucket_width
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(amqp_url) = &args.amqp_url {
        config.amqp.url = amqp_url.clone();
    }

    if let Some(health_port) = args.health_port {
        config.service.health_port = health_port;
    }

    if args.no_bot_backfill {
        config.matchmaking.enable_bot_backfill = false;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config, args.standalone).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let build = if args.standalone {
        AppState::standalone(config.clone())
    } else {
        AppState::new(config.clone()).await
    };
    let mut app_state = match build {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Arena Lobby Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(()) => {
            info!("Graceful shutdown completed successfully");
        }
        Err(_) => {
            warn!("Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("Arena Lobby Service stopped");
    Ok(())
}
