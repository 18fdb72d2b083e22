//! Transport layer for fingerprint/RFID terminals
//!
//! Provides line-oriented, half-duplex channels to the device over a serial
//! line, a TCP serial bridge, or the device's HTTP tunnel.

pub mod error;
pub mod http;
pub mod line;
pub mod mock;
pub mod serial;
pub mod tcp;

pub use error::{Error, Result};
pub use http::HttpTransport;
pub use line::LineStream;
pub use mock::{Scripted, ScriptedTransport};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use async_trait::async_trait;
use tokio::time::Instant;

/// Result of a bounded line read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One full line, terminator stripped
    Line(String),

    /// Bytes arrived but no line terminator yet
    ///
    /// Lets callers count a line still in transit as activity.
    Partial,

    /// Deadline reached before a full line arrived
    Idle,
}

/// Transport trait for different communication methods
///
/// Implementations must only return [`ReadOutcome::Idle`] once the deadline
/// has passed; a timeout is a normal outcome, not an error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Acquire the underlying medium
    ///
    /// Fails with [`Error::Unavailable`] (or an address error) when the
    /// medium cannot be acquired. Nothing is held on failure.
    async fn open(&mut self) -> Result<()>;

    /// Release the medium (idempotent)
    async fn close(&mut self) -> Result<()>;

    /// Check if open
    fn is_open(&self) -> bool;

    /// Send one command line and flush
    async fn write_line(&mut self, line: &str) -> Result<()>;

    /// Wait for the next line until `deadline`
    async fn read_line(&mut self, deadline: Instant) -> Result<ReadOutcome>;

    /// Discard anything already buffered, returning the number of bytes
    /// (or lines) dropped
    async fn drain_stale(&mut self) -> Result<usize>;

    /// Check if the device announces itself with a "ready" line after open
    fn sends_handshake(&self) -> bool {
        true
    }

    /// Get remote address
    fn remote_addr(&self) -> String;
}
