//! Load generator for a netpool echo server.
//!
//! Runs N concurrent clients over one shared `ConnectionPool`. Each request
//! acquires a connection, writes a message, reads the echo back and returns
//! the connection to the pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use netpool::config::ObservabilityConfig;
use netpool::observability::logging;
use netpool::{ConnectionPool, PoolConfig, PoolError, TcpConnectionFactory};

#[derive(Parser, Debug)]
#[command(name = "pool-client", version, about = "Drive a netpool echo server through a connection pool")]
struct Cli {
    /// Server address.
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    addr: String,

    /// Concurrent clients.
    #[arg(short, long, default_value_t = 8)]
    clients: usize,

    /// Requests per client.
    #[arg(short, long, default_value_t = 10)]
    requests: usize,

    /// Payload written on every request.
    #[arg(short, long, default_value = "ping")]
    message: String,

    /// Connections opened up front (0 = pool default).
    #[arg(long, default_value_t = 0)]
    init_conns: usize,

    /// Pool capacity (0 = pool default).
    #[arg(long, default_value_t = 0)]
    max_conns: usize,

    /// Wait this long for a free connection; 0 fails fast when exhausted.
    #[arg(long, default_value_t = 0)]
    acquire_timeout_ms: u64,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    exhausted: AtomicU64,
    mismatched: AtomicU64,
    latency_us: AtomicU64,
}

#[derive(Debug, Serialize)]
struct Summary {
    addr: String,
    clients: usize,
    requests: usize,
    succeeded: u64,
    failed: u64,
    exhausted: u64,
    mismatched: u64,
    elapsed_ms: u64,
    avg_latency_us: u64,
    pool_open: usize,
    pool_idle: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    logging::init_logging(&ObservabilityConfig {
        log_level: cli.log_level.clone(),
        ..ObservabilityConfig::default()
    })?;

    let config = PoolConfig::new(TcpConnectionFactory::new())
        .init_conns(cli.init_conns)
        .max_conns(cli.max_conns);
    let pool = Arc::new(ConnectionPool::new(cli.addr.clone(), config).await?);
    tracing::info!(pool = ?pool, "Pool ready");

    let counters = Arc::new(Counters::default());
    let payload = Arc::new(cli.message.clone().into_bytes());
    let acquire_timeout = Duration::from_millis(cli.acquire_timeout_ms);
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(cli.clients);
    for client in 0..cli.clients {
        let pool = Arc::clone(&pool);
        let counters = Arc::clone(&counters);
        let payload = Arc::clone(&payload);
        let requests = cli.requests;
        tasks.push(tokio::spawn(async move {
            for _ in 0..requests {
                let begun = Instant::now();
                match request(&pool, &payload, acquire_timeout).await {
                    Ok(true) => {
                        counters.succeeded.fetch_add(1, Ordering::Relaxed);
                        counters
                            .latency_us
                            .fetch_add(begun.elapsed().as_micros() as u64, Ordering::Relaxed);
                    }
                    Ok(false) => {
                        counters.mismatched.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(RequestError::Pool(PoolError::Exhausted)) => {
                        counters.exhausted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::debug!(client, error = %e, "Request failed");
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }));
    }

    for task in tasks {
        task.await?;
    }

    let stats = pool.stats();
    let succeeded = counters.succeeded.load(Ordering::Relaxed);
    let summary = Summary {
        addr: cli.addr.clone(),
        clients: cli.clients,
        requests: cli.requests,
        succeeded,
        failed: counters.failed.load(Ordering::Relaxed),
        exhausted: counters.exhausted.load(Ordering::Relaxed),
        mismatched: counters.mismatched.load(Ordering::Relaxed),
        elapsed_ms: started.elapsed().as_millis() as u64,
        avg_latency_us: counters
            .latency_us
            .load(Ordering::Relaxed)
            .checked_div(succeeded)
            .unwrap_or(0),
        pool_open: stats.open,
        pool_idle: stats.idle,
    };

    pool.shutdown().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One round trip. `Ok(false)` means the echo did not match.
async fn request(
    pool: &ConnectionPool<TcpConnectionFactory>,
    payload: &[u8],
    acquire_timeout: Duration,
) -> Result<bool, RequestError> {
    let mut conn = if acquire_timeout.is_zero() {
        pool.acquire().await?
    } else {
        pool.acquire_timeout(acquire_timeout).await?
    };

    match echo(&mut conn, payload).await {
        Ok(matched) => {
            pool.release(conn).await?;
            Ok(matched)
        }
        Err(e) => {
            pool.discard(conn).await;
            Err(e.into())
        }
    }
}

async fn echo(conn: &mut TcpStream, payload: &[u8]) -> std::io::Result<bool> {
    conn.write_all(payload).await?;
    let mut buf = vec![0u8; payload.len()];
    conn.read_exact(&mut buf).await?;
    Ok(buf == payload)
}

fn print_summary(summary: &Summary) {
    println!("Target:        {}", summary.addr);
    println!("Clients:       {} x {} requests", summary.clients, summary.requests);
    println!("Succeeded:     {}", summary.succeeded);
    println!("Failed:        {}", summary.failed);
    println!("Exhausted:     {}", summary.exhausted);
    println!("Mismatched:    {}", summary.mismatched);
    println!("Elapsed:       {} ms", summary.elapsed_ms);
    println!("Avg latency:   {} us", summary.avg_latency_us);
    println!("Pool:          {} open, {} idle", summary.pool_open, summary.pool_idle);
}
