//! Newline framing over a byte stream

use std::time::Duration;

use bytes::BytesMut;
use fingerlink_core::constants::MAX_LINE_LENGTH;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{trace, warn};

use crate::{error::*, ReadOutcome};

/// Upper bound on a single drain, in drain windows
///
/// A device that never stops talking must not stall the next command.
const MAX_DRAIN_WINDOWS: u32 = 50;

/// Line reader/writer over any async byte stream
///
/// Partial lines stay buffered across reads, so a read that times out in
/// the middle of a line loses nothing.
pub struct LineStream<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> LineStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(1024),
        }
    }

    /// Get the underlying stream
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Release the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read the next line, or report idle once `deadline` passes
    ///
    /// Bytes that do not complete a line yield [`ReadOutcome::Partial`].
    pub async fn read_line(&mut self, deadline: Instant) -> Result<ReadOutcome> {
        if let Some(line) = self.take_line() {
            return Ok(ReadOutcome::Line(line));
        }

        if self.buf.len() > MAX_LINE_LENGTH {
            warn!("Discarding {} bytes without line terminator", self.buf.len());
            self.buf.clear();
        }

        self.buf.reserve(256);

        let n = match timeout_at(deadline, self.stream.read_buf(&mut self.buf)).await {
            Err(_) => return Ok(ReadOutcome::Idle),
            Ok(result) => result?,
        };

        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        trace!("Received {} bytes", n);

        Ok(self.take_line().map_or(ReadOutcome::Partial, ReadOutcome::Line))
    }

    /// Write one line followed by `\n` and flush
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        trace!("Sending line: {:?}", line);

        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;

        Ok(())
    }

    /// Drop buffered bytes, then keep reading until the stream stays quiet
    /// for `window`
    pub async fn drain(&mut self, window: Duration) -> Result<usize> {
        let mut discarded = self.buf.len();
        self.buf.clear();

        let mut scratch = BytesMut::with_capacity(256);

        for _ in 0..MAX_DRAIN_WINDOWS {
            scratch.clear();
            scratch.reserve(256);

            match timeout(window, self.stream.read_buf(&mut scratch)).await {
                Err(_) => break,
                Ok(Ok(0)) => return Err(Error::ConnectionClosed),
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(Error::Io(e)),
            }
        }

        if discarded > 0 {
            trace!("Drained {} stale bytes", discarded);
        }

        Ok(discarded)
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let raw = self.buf.split_to(pos + 1);

        let mut end = raw.len() - 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }

        Some(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_lines_with_crlf() {
        let (client, mut device) = duplex(256);
        let mut lines = LineStream::new(client);

        device.write_all(b"Place finger\r\nRemove finger\n5").await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(lines.read_line(deadline).await.unwrap(), ReadOutcome::Line("Place finger".into()));
        assert_eq!(lines.read_line(deadline).await.unwrap(), ReadOutcome::Line("Remove finger".into()));

        // "5" has no terminator yet and is already buffered
        assert_eq!(lines.read_line(deadline).await.unwrap(), ReadOutcome::Idle);

        device.write_all(b"\r\n").await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(lines.read_line(deadline).await.unwrap(), ReadOutcome::Line("5".into()));
    }

    #[tokio::test]
    async fn test_partial_line_reports_activity() {
        let (client, mut device) = duplex(256);
        let mut lines = LineStream::new(client);

        device.write_all(b"Place fin").await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(lines.read_line(deadline).await.unwrap(), ReadOutcome::Partial);

        device.write_all(b"ger\n").await.unwrap();
        assert_eq!(lines.read_line(deadline).await.unwrap(), ReadOutcome::Line("Place finger".into()));
    }

    #[tokio::test]
    async fn test_write_line_appends_newline() {
        let (client, mut device) = duplex(256);
        let mut lines = LineStream::new(client);

        lines.write_line("DELETE 4").await.unwrap();

        let mut buf = [0u8; 9];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"DELETE 4\n");
    }

    #[tokio::test]
    async fn test_drain_discards_buffered_and_pending() {
        let (client, mut device) = duplex(256);
        let mut lines = LineStream::new(client);

        device.write_all(b"Sensor contains 3 templates\nleftover").await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(50);
        let _ = lines.read_line(deadline).await.unwrap();

        let dropped = lines.drain(Duration::from_millis(10)).await.unwrap();
        assert_eq!(dropped, "leftover".len());

        device.write_all(b"PONG\n").await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(50);
        assert_eq!(lines.read_line(deadline).await.unwrap(), ReadOutcome::Line("PONG".into()));
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (client, device) = duplex(64);
        let mut lines = LineStream::new(client);
        drop(device);

        let deadline = Instant::now() + Duration::from_millis(50);
        assert!(matches!(lines.read_line(deadline).await, Err(Error::ConnectionClosed)));
    }
}
