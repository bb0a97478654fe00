//! Ferry - a session-scoped web relay.
//!
//! This binary wires the pieces together:
//! - Session registry and response cache
//! - Forwarding engine over a reqwest transport
//! - Periodic cleanup task
//! - HTTP API server

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use ferry_core::SessionRegistry;
use ferry_proxy::{CleanupTask, ForwardingEngine, ReqwestTransport, ResponseCache};
use ferry_server::{AppState, Server, ServerConfig};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

/// Ferry - forward web traffic through a session-scoped relay
#[derive(Parser, Debug)]
#[command(name = "ferry", version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config)
    #[arg(long, short)]
    port: Option<u16>,

    /// Public base URL used in rewritten links (overrides config)
    #[arg(long)]
    proxy_base_url: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "ferry", "Ferry").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ferry={0},ferry_core={0},ferry_proxy={0},ferry_server={0},warn",
            log_level
        ))
    });

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("ferry")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

/// Applies command-line overrides on top of the loaded config.
fn apply_overrides(mut config: AppConfig, args: &Args) -> AppConfig {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(base) = &args.proxy_base_url {
        config.proxy.proxy_base_url = base.clone();
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging(&args);

    let config = apply_overrides(AppConfig::resolve(args.config.as_deref())?, &args);
    let settings = Arc::new(config.proxy);

    tracing::info!(
        "Ferry v{} starting (relay base {})",
        env!("CARGO_PKG_VERSION"),
        settings.proxy_base()
    );

    let sessions = SessionRegistry::new().with_timeout(settings.session_timeout());
    let cache = ResponseCache::new();
    let transport =
        ReqwestTransport::from_settings(&settings).context("failed to build HTTP client")?;

    let engine = ForwardingEngine::new(
        sessions.clone(),
        cache.clone(),
        Arc::new(transport),
        settings.clone(),
    );

    let cleanup = CleanupTask::new(sessions, cache)
        .with_interval(settings.cleanup_interval())
        .start();

    let server_config: ServerConfig = config.server.into();
    let server = Server::new(server_config, AppState::new(engine))?;

    let result = server
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
            }
        })
        .await;

    cleanup.stop().await;
    tracing::info!("Ferry shutdown complete");

    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from([
            "ferry",
            "--port",
            "9000",
            "--proxy-base-url",
            "https://relay.example",
        ]);

        let config = apply_overrides(AppConfig::default(), &args);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.proxy.proxy_base_url, "https://relay.example");
    }

    #[test]
    fn defaults_leave_config_alone() {
        let args = Args::parse_from(["ferry"]);
        assert_eq!(apply_overrides(AppConfig::default(), &args), AppConfig::default());
        assert_eq!(args.log_level, "info");
    }
}
