//! Stream wrapper enforcing fixed read and write deadlines.
//!
//! Deadlines are absolute: they are computed once when the connection is
//! wrapped, and every read (or write) attempted after its deadline fails
//! with [`io::ErrorKind::TimedOut`]. A pending read is woken when the
//! deadline passes.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep, Sleep};

pin_project_lite::pin_project! {
    /// A stream whose reads and writes stop working after fixed deadlines.
    pub struct DeadlineStream<S> {
        #[pin]
        inner: S,
        read_deadline: Option<Pin<Box<Sleep>>>,
        write_deadline: Option<Pin<Box<Sleep>>>,
    }
}

impl<S> DeadlineStream<S> {
    /// Wrap `inner`. A zero timeout disables the corresponding deadline.
    pub fn new(inner: S, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            inner,
            read_deadline: (!read_timeout.is_zero()).then(|| Box::pin(sleep(read_timeout))),
            write_deadline: (!write_timeout.is_zero()).then(|| Box::pin(sleep(write_timeout))),
        }
    }

    /// Get a reference to the inner stream.
    #[inline]
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner stream.
    #[inline]
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the wrapper, returning the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn has_read_deadline(&self) -> bool {
        self.read_deadline.is_some()
    }

    pub fn has_write_deadline(&self) -> bool {
        self.write_deadline.is_some()
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for DeadlineStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineStream")
            .field("inner", &self.inner)
            .field("read_deadline", &self.read_deadline.as_ref().map(|s| s.deadline()))
            .field("write_deadline", &self.write_deadline.as_ref().map(|s| s.deadline()))
            .finish()
    }
}

fn expired(deadline: &mut Option<Pin<Box<Sleep>>>, cx: &mut Context<'_>) -> bool {
    match deadline {
        Some(sleep) => sleep.as_mut().poll(cx).is_ready(),
        None => false,
    }
}

fn timed_out(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} deadline exceeded", op))
}

impl<S: AsyncRead> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        if expired(this.read_deadline, cx) {
            return Poll::Ready(Err(timed_out("read")));
        }
        this.inner.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        if expired(this.write_deadline, cx) {
            return Poll::Ready(Err(timed_out("write")));
        }
        this.inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        if expired(this.write_deadline, cx) {
            return Poll::Ready(Err(timed_out("write")));
        }
        this.inner.poll_flush(cx)
    }

    // Shutdown is never subject to the write deadline so the connection can
    // always be closed cleanly.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn no_deadline_passes_through() {
        let (mut client, server) = duplex(64);
        let mut stream = DeadlineStream::new(server, Duration::ZERO, Duration::ZERO);
        assert!(!stream.has_read_deadline());

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn pending_read_times_out() {
        let (_client, server) = duplex(64);
        let mut stream = DeadlineStream::new(server, Duration::from_millis(50), Duration::ZERO);

        let mut buf = [0u8; 1];
        let err = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("deadline should wake the read")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn write_after_deadline_fails() {
        let (_client, server) = duplex(64);
        let mut stream = DeadlineStream::new(server, Duration::ZERO, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(40)).await;

        let err = stream.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        stream.shutdown().await.unwrap();
    }
}
