//! Socket option helpers.

use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// Enable TCP keep-alive, sending the first probe after `idle` of silence.
pub fn set_keep_alive(stream: &TcpStream, idle: Duration) -> io::Result<()> {
    let sock = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(idle);

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
    let keepalive = keepalive.with_interval(idle);

    sock.set_tcp_keepalive(&keepalive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn enables_keep_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();

        set_keep_alive(&stream, Duration::from_secs(30)).unwrap();
        assert!(socket2::SockRef::from(&stream).keepalive().unwrap());
    }
}
