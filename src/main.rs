//! netpool server
//!
//! Runs one of the built-in handlers behind the TCP server.
//!
//! ```text
//!     Client ──▶ listener ──▶ accept loop ──▶ Handler
//!                                              │ echo  : bytes back to the client
//!                                              │ pong  : fixed greeting
//!                                              └ proxy : ConnectionPool ──▶ upstream
//! ```
//!
//! SIGINT/SIGTERM stops accepting and drains in-flight connections for
//! `shutdown_grace_ms` before force-closing them.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use netpool::config::validation::validate_config;
use netpool::config::{load_config, AppConfig, ConfigError, HandlerKind};
use netpool::lifecycle::signals::spawn_signal_listener;
use netpool::observability::{logging, metrics};
use netpool::server::handlers::{EchoHandler, PongHandler, ProxyHandler};
use netpool::server::{Handler, ServerBuilder};
use netpool::{ConnectionPool, PoolConfig, Shutdown, TcpConnectionFactory};

#[derive(Parser, Debug)]
#[command(name = "netpool", version, about = "TCP server with a pooled upstream proxy")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override `server.handler`.
    #[arg(long, value_enum)]
    handler: Option<HandlerKind>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(handler) = cli.handler {
        config.server.handler = handler;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "netpool starting");

    tracing::info!(
        bind_address = %config.server.bind_address,
        handler = %config.server.handler,
        read_timeout_ms = config.server.read_timeout_ms,
        write_timeout_ms = config.server.write_timeout_ms,
        shutdown_grace_ms = config.server.shutdown_grace_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let grace = config.server.shutdown_grace();
    match config.server.handler {
        HandlerKind::Echo => run(&config, EchoHandler, &shutdown, grace).await?,
        HandlerKind::Pong => run(&config, PongHandler, &shutdown, grace).await?,
        HandlerKind::Proxy => {
            let upstream = config.proxy.upstream.clone().unwrap_or_default();
            let factory =
                TcpConnectionFactory::new().with_connect_timeout(config.pool.connect_timeout());
            let pool = Arc::new(
                ConnectionPool::new(upstream, PoolConfig::from_settings(&config.pool, factory))
                    .await?,
            );
            tracing::info!(upstream = %pool.addr(), limits = ?pool.limits(), "Upstream pool ready");

            let served = run(&config, ProxyHandler::new(Arc::clone(&pool)), &shutdown, grace).await;
            if let Err(e) = pool.shutdown().await {
                tracing::warn!(error = %e, "Upstream pool shutdown failed");
            }
            served?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Serve until `shutdown` fires or the server fails, then drain.
async fn run<H: Handler>(
    config: &AppConfig,
    handler: H,
    shutdown: &Shutdown,
    grace: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = ServerBuilder::from_settings(&config.server)
        .handler(handler)
        .base_context(shutdown.clone())
        .build();

    let mut serving = {
        let server = server.clone();
        tokio::spawn(async move { server.listen_and_serve().await })
    };

    let stopped_early = tokio::select! {
        _ = shutdown.wait() => None,
        res = &mut serving => Some(res),
    };

    if let Some(res) = stopped_early {
        // The accept loop only ends on its own when startup failed.
        shutdown.trigger();
        return match res? {
            Err(e) if !server.is_closed() => Err(e.into()),
            _ => Ok(()),
        };
    }

    tracing::info!(grace_ms = grace.as_millis() as u64, "Draining connections");
    if let Err(e) = server.shutdown(grace).await {
        tracing::warn!(error = %e, "Shutdown finished with errors");
    }
    if let Ok(Err(e)) = serving.await {
        tracing::debug!(error = %e, "Accept loop stopped");
    }

    Ok(())
}
