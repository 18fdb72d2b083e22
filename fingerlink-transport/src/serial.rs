//! Serial transport

use std::time::Duration;

use async_trait::async_trait;
use fingerlink_core::constants::{DEFAULT_BAUD_RATE, DEFAULT_DRAIN_WINDOW_MS};
use tokio::io::AsyncWriteExt;
use tokio::task::spawn_blocking;
use tokio::time::Instant;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

use crate::{error::*, LineStream, ReadOutcome, Transport};

/// Serial line to the terminal (8N1, no flow control)
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    drain_window: Duration,
    stream: Option<LineStream<SerialStream>>,
}

impl SerialTransport {
    /// Create new serial transport
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            drain_window: Duration::from_millis(DEFAULT_DRAIN_WINDOW_MS),
            stream: None,
        }
    }

    /// Set baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set quiet period used to detect the end of stale input
    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| Error::Unavailable(format!("{}: {}", path, e)))
    }

    fn stream(&mut self) -> Result<&mut LineStream<SerialStream>> {
        self.stream.as_mut().ok_or(Error::NotOpen)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        debug!("Opening {} at {} baud...", self.path, self.baud_rate);

        let path = self.path.clone();
        let baud_rate = self.baud_rate;

        // Port setup can block on some drivers
        let port = spawn_blocking(move || Self::open_port(&path, baud_rate))
            .await
            .map_err(|e| Error::Unavailable(format!("port open task failed: {}", e)))??;

        debug!("Opened {}", self.path);

        self.stream = Some(LineStream::new(port));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            debug!("Closing {}...", self.path);

            let mut port = stream.into_inner();
            let _ = port.shutdown().await;
        }

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
        format!("{}@{}", self.path, self.baud_rate)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("Serial transport dropped while still open");
        }
    }
}
