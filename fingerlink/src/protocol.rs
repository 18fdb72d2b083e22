//! Command protocol over a line transport
//!
//! One `Protocol` owns one transport and runs one command at a time:
//!
//! ```text
//! open:     transport.open → wait for "ready" sentinel (best effort)
//! execute:  drain stale input → write command once → collect lines until
//!           a terminal line, the overall deadline or the idle-gap ceiling
//! ```

use fingerlink_core::{ChannelState, Command, Dialect, LineClass, ProtocolResult, Session, Terminal};
use fingerlink_transport::{ReadOutcome, Transport};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::Timing;
use crate::error::{Error, Result};

/// Callback receiving each continuation line as it arrives
pub type Progress<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Half-duplex command channel to one terminal
pub struct Protocol {
    transport: Box<dyn Transport>,
    dialect: Dialect,
    timing: Timing,
    session: Session,
}

impl Protocol {
    pub fn new(transport: Box<dyn Transport>, dialect: Dialect, timing: Timing) -> Self {
        Self {
            transport,
            dialect,
            timing,
            session: Session::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Shared view of the channel state
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn remote_addr(&self) -> String {
        self.transport.remote_addr()
    }

    /// Open the transport and wait for the device to announce itself
    ///
    /// A missing "ready" sentinel is tolerated; the channel becomes ready
    /// once the handshake timeout passes. Nothing stays acquired when this
    /// fails.
    pub async fn open(&mut self) -> Result<()> {
        if self.session.is_open() {
            return Ok(());
        }

        info!("Opening {} ({} dialect)...", self.transport.remote_addr(), self.dialect);

        if let Err(e) = self.transport.open().await {
            let _ = self.transport.close().await;
            return Err(Error::TransportUnavailable(e.to_string()));
        }

        self.session.begin_handshake()?;

        if self.transport.sends_handshake() {
            if let Err(e) = self.await_ready().await {
                let _ = self.transport.close().await;
                self.session.close();
                return Err(e);
            }
        }

        self.session.handshake_complete()?;
        info!("Channel ready");
        Ok(())
    }

    async fn await_ready(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.timing.handshake();

        loop {
            match self.transport.read_line(deadline).await {
                Ok(ReadOutcome::Line(line)) => {
                    let line = line.trim();
                    if self.dialect.is_ready_sentinel(line) {
                        debug!("Device ready: {}", line);
                        return Ok(());
                    }
                    trace!("Discarding banner: {:?}", line);
                }
                Ok(ReadOutcome::Partial) => {}
                Ok(ReadOutcome::Idle) => {
                    warn!(
                        "No ready sentinel within {}ms, continuing",
                        self.timing.handshake_ms
                    );
                    return Ok(());
                }
                Err(e) => return Err(Error::TransportUnavailable(e.to_string())),
            }
        }
    }

    /// Release the transport (idempotent)
    pub async fn close(&mut self) -> Result<()> {
        if self.session.state() == ChannelState::Idle {
            return Ok(());
        }

        let result = self.transport.close().await;
        self.session.close();
        info!("Channel closed");

        result.map_err(Error::from)
    }

    /// Run one command to its terminal line
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolTimeout`] when the overall deadline or the idle-gap
    ///   ceiling passes first
    /// - [`Error::DeviceRejected`] for an explicit error terminal
    /// - [`Error::TransportFailure`] for I/O failures; the channel stays
    ///   not-ready until the next drain/send cycle succeeds
    /// - [`Error::MalformedResponse`] for a terminal line that does not parse
    pub async fn execute(&mut self, command: Command, progress: Option<Progress<'_>>) -> Result<ProtocolResult> {
        self.session.begin_send().map_err(|e| match e {
            fingerlink_core::Error::SessionNotOpen => Error::NotConnected,
            other => Error::Core(other),
        })?;

        let started = Instant::now();
        let overall = started + self.timing.command_timeout(command.kind());
        let idle_gap = self.timing.idle_gap();

        match self.transport.drain_stale().await {
            Ok(0) => {}
            Ok(n) => debug!("Discarded {} stale units before {}", n, command),
            Err(e) => return Err(self.link_failure(e, Vec::new())),
        }

        debug!("Sending {}", command);
        if let Err(e) = self.transport.write_line(&command.wire()).await {
            return Err(self.link_failure(e, Vec::new()));
        }
        self.session.begin_collect()?;

        let mut lines = Vec::new();
        let mut last_activity = Instant::now();

        loop {
            let idle_deadline = last_activity + idle_gap;
            let deadline = overall.min(idle_deadline);

            let raw = match self.transport.read_line(deadline).await {
                Ok(ReadOutcome::Line(raw)) => raw,
                Ok(ReadOutcome::Partial) => {
                    last_activity = Instant::now();
                    continue;
                }
                Ok(ReadOutcome::Idle) => {
                    self.session.fail()?;
                    let elapsed = started.elapsed();
                    let idle = idle_deadline < overall;
                    warn!(
                        "{} timed out after {}ms ({} lines collected)",
                        command,
                        elapsed.as_millis(),
                        lines.len()
                    );
                    return Err(Error::ProtocolTimeout {
                        command,
                        elapsed,
                        idle,
                        lines,
                    });
                }
                Err(e) => return Err(self.link_failure(e, lines)),
            };

            last_activity = Instant::now();

            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            trace!("<< {:?}", line);

            match self.dialect.classify(command, line) {
                Ok(LineClass::Banner) => trace!("Discarding banner: {:?}", line),
                Ok(LineClass::Stale(terminal)) => {
                    debug!("Discarding {:?} left over from an earlier command", terminal)
                }
                Ok(LineClass::Continuation) => {
                    if let Some(progress) = progress {
                        progress(line);
                    }
                    lines.push(line.to_string());
                }
                Ok(LineClass::Terminal(Terminal::Rejected(message))) => {
                    self.session.fail()?;
                    lines.push(line.to_string());
                    warn!("{} rejected by device: {}", command, message);
                    return Err(Error::DeviceRejected { message, lines });
                }
                Ok(LineClass::Terminal(terminal)) => {
                    self.session.complete()?;
                    lines.push(line.to_string());
                    let result = ProtocolResult::new(command, lines, terminal, started.elapsed());
                    debug!("{}", result);
                    return Ok(result);
                }
                Err(e) => {
                    self.session.fail()?;
                    lines.push(line.to_string());
                    return Err(Error::MalformedResponse {
                        message: e.to_string(),
                        lines,
                    });
                }
            }
        }
    }

    fn link_failure(&self, error: fingerlink_transport::Error, lines: Vec<String>) -> Error {
        if matches!(error, fingerlink_transport::Error::NotOpen) {
            return Error::NotConnected;
        }

        warn!("Transport failure: {}", error);
        self.session.mark_not_ready();
        Error::TransportFailure {
            message: error.to_string(),
            lines,
        }
    }
}
