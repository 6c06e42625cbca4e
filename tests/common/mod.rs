//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use netpool::server::{Handler, Server};
use netpool::ConnectionFactory;

/// In-memory connection handed out by [`CountingFactory`].
#[derive(Debug, PartialEq, Eq)]
pub struct FakeConn {
    pub id: usize,
    pub broken: bool,
}

/// Factory that counts every call it receives.
#[derive(Debug, Clone, Default)]
pub struct CountingFactory {
    pub created: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub pinged: Arc<AtomicUsize>,
    pub fail_ping: Arc<AtomicBool>,
    /// Milliseconds each ping takes.
    pub ping_delay_ms: Arc<AtomicU64>,
    /// Ids of every connection closed, in order.
    pub closed_ids: Arc<std::sync::Mutex<Vec<usize>>>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pinged(&self) -> usize {
        self.pinged.load(Ordering::SeqCst)
    }

    pub fn slow_ping(&self, delay: Duration) {
        self.ping_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn closed_ids(&self) -> Vec<usize> {
        self.closed_ids.lock().unwrap().clone()
    }
}

impl ConnectionFactory for CountingFactory {
    type Connection = FakeConn;

    async fn new_connection(&self, _addr: &str) -> io::Result<FakeConn> {
        let id = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConn { id, broken: false })
    }

    async fn close(&self, conn: FakeConn) -> io::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.closed_ids.lock().unwrap().push(conn.id);
        Ok(())
    }

    async fn ping(&self, conn: &mut FakeConn) -> io::Result<()> {
        self.pinged.fetch_add(1, Ordering::SeqCst);
        let delay = self.ping_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if conn.broken || self.fail_ping.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "ping failed"));
        }
        Ok(())
    }
}

/// Start `server` on an ephemeral port and return its address.
pub async fn start_server<H: Handler>(server: &Server<H>) -> SocketAddr {
    let running = server.clone();
    tokio::spawn(async move {
        let _ = running.listen_and_serve().await;
    });

    tokio::time::timeout(Duration::from_secs(5), server.wait_listening())
        .await
        .expect("server should start listening")
        .expect("server should have a bound address")
}

/// Write `payload` and read back the same number of bytes.
pub async fn round_trip(stream: &mut TcpStream, payload: &[u8]) -> io::Result<Vec<u8>> {
    stream.write_all(payload).await?;
    let mut buf = vec![0u8; payload.len()];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Read until the peer closes, bounded by one second.
pub async fn read_to_close(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(1), stream.read_to_end(&mut buf))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "peer kept the connection open"))??;
    Ok(buf)
}

/// Poll `condition` every 10ms until it holds, for at most two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition should become true");
}

/// Counts ERROR-level tracing events.
#[derive(Debug, Clone, Default)]
pub struct ErrorEvents(Arc<AtomicUsize>);

impl ErrorEvents {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorEvents {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
