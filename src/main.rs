//! a2a-relay — agent runtime entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config, apply env overrides, validate for the configured role
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Open the parameter store and build the supervisor
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Run the HTTP server (and the idle-session sweeper, if configured)
//!      until shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use a2a_relay::config;
use a2a_relay::error::AppError;
use a2a_relay::logger::{self, LogSettings};
use a2a_relay::params::JsonFileParams;
use a2a_relay::subsystems::comms::{HttpServer, SessionResources};
use a2a_relay::subsystems::runtime::{Component, spawn_components};
use a2a_relay::subsystems::sessions::{SessionRegistry, SessionSweeper};
use a2a_relay::supervisor::Supervisor;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;
    config.validate()?;

    let level_is_override = args.log_level.is_some();
    let effective_log_level = args.log_level.unwrap_or(config.runtime.log_level.as_str()).to_string();
    logger::init(&LogSettings {
        level: effective_log_level.clone(),
        level_is_override,
        file: config.runtime.log_file.clone(),
    })?;

    info!(
        role = config.runtime.role.as_str(),
        agent = %config.agent.name,
        bind = %config.http.bind,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let params = Arc::new(JsonFileParams::open(&config.params.path)?);
    let bind = config.http.bind.clone();
    let ttl = config.sessions.idle_ttl_seconds;
    let sweep_every = config.sessions.sweep_interval_seconds;

    let supervisor = Supervisor::new(config, params)?;
    let registry = Arc::new(SessionRegistry::<SessionResources>::new());

    // Shared shutdown token — Ctrl-C cancels it, all components watch it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let mut components: Vec<Box<dyn Component>> = vec![Box::new(HttpServer::new(
        bind,
        supervisor.server_state(registry.clone()),
    ))];
    if let Some(ttl) = ttl {
        info!(ttl_seconds = ttl, "idle session eviction enabled");
        components.push(Box::new(SessionSweeper::new(
            registry,
            Duration::from_secs(ttl),
            Duration::from_secs(sweep_every.max(1)),
        )));
    }

    spawn_components(components, shutdown.clone()).join().await?;
    shutdown.cancel();

    info!("shutdown complete");
    Ok(())
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: a2a-relay [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
