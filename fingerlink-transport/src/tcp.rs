//! TCP transport (serial-over-TCP bridge)

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use fingerlink_core::constants::DEFAULT_DRAIN_WINDOW_MS;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::{error::*, LineStream, ReadOutcome, Transport};

/// Line channel to a terminal behind a serial bridge
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<LineStream<TcpStream>>,
    connect_timeout: Duration,
    drain_window: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
            drain_window: Duration::from_millis(DEFAULT_DRAIN_WINDOW_MS),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set quiet period used to detect the end of stale input
    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }

    fn stream(&mut self) -> Result<&mut LineStream<TcpStream>> {
        self.stream.as_mut().ok_or(Error::NotOpen)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(|e| Error::Unavailable(format!("{}: {}", addr, e)))?;

        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.stream = Some(LineStream::new(stream));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            let mut stream = stream.into_inner();
            let _ = stream.shutdown().await;
        }

        self.socket_addr = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.stream()?.write_line(line).await
    }

    async fn read_line(&mut self, deadline: Instant) -> Result<ReadOutcome> {
        self.stream()?.read_line(deadline).await
    }

    async fn drain_stale(&mut self) -> Result<usize> {
        let window = self.drain_window;
        self.stream()?.drain(window).await
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("TCP transport dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_transport_create() {
        let transport = TcpTransport::new("192.168.1.50", 4001);
        assert!(!transport.is_open());
        assert_eq!(transport.remote_addr(), "192.168.1.50:4001");
    }

    #[tokio::test]
    async fn test_tcp_transport_invalid_address() {
        let mut transport = TcpTransport::new("invalid..address", 4001)
            .with_connect_timeout(Duration::from_millis(100));

        let err = transport.open().await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_line_exchange_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let device = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();

            let command = lines.next_line().await.unwrap().unwrap();
            assert_eq!(command, "COUNT");
            write.write_all(b"Sensor contains 2 templates\r\n").await.unwrap();
        });

        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.open().await.unwrap();

        transport.write_line("COUNT").await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        let line = transport.read_line(deadline).await.unwrap();
        assert_eq!(line, ReadOutcome::Line("Sensor contains 2 templates".into()));

        device.await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_open());
    }
}
