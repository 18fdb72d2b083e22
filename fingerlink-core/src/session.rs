//! Channel state tracking
//!
//! A session mirrors the command protocol's state machine so that it can be
//! observed without waiting for the in-flight command:
//!
//! ```text
//! IDLE → AWAITING_HANDSHAKE → READY → SENDING → COLLECTING → DONE | FAILED
//!                               ↑                                 │
//!                               └─────────── next command ────────┘
//! ```
//!
//! A transport failure parks the channel in `NOT_READY` until the next
//! successful drain/send cycle. A command whose caller gave up mid-flight
//! leaves the session in `SENDING` or `COLLECTING`; the next send takes over
//! from there and relies on the drain to resynchronise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};

/// Channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Never opened
    Idle,

    /// Opened, waiting for the device "ready" sentinel
    AwaitingHandshake,

    /// Accepting commands
    Ready,

    /// Command line being written
    Sending,

    /// Reading response lines
    Collecting,

    /// Last command reached a terminal line
    Done,

    /// Last command failed without breaking the link
    Failed,

    /// Transport failure; must resynchronise before reuse
    NotReady,

    /// Closed by the owner
    Closed,
}

/// Session manager
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Current channel state
    state: parking_lot::RwLock<ChannelState>,

    /// Commands written since open
    commands_sent: AtomicU64,
}

impl Session {
    /// Create a new idle session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: parking_lot::RwLock::new(ChannelState::Idle),
                commands_sent: AtomicU64::new(0),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> ChannelState {
        *self.inner.state.read()
    }

    /// Check if the channel was opened and not closed since
    pub fn is_open(&self) -> bool {
        !matches!(self.state(), ChannelState::Idle | ChannelState::Closed)
    }

    /// Check if a command can be sent without resynchronising first
    pub fn is_ready(&self) -> bool {
        matches!(
            self.state(),
            ChannelState::Ready | ChannelState::Done | ChannelState::Failed
        )
    }

    /// Number of commands written since the channel was opened
    pub fn commands_sent(&self) -> u64 {
        self.inner.commands_sent.load(Ordering::Acquire)
    }

    /// IDLE/CLOSED → AWAITING_HANDSHAKE
    pub fn begin_handshake(&self) -> Result<()> {
        self.transition(
            &[ChannelState::Idle, ChannelState::Closed],
            ChannelState::AwaitingHandshake,
        )?;
        self.inner.commands_sent.store(0, Ordering::Release);
        Ok(())
    }

    /// AWAITING_HANDSHAKE → READY
    pub fn handshake_complete(&self) -> Result<()> {
        self.transition(&[ChannelState::AwaitingHandshake], ChannelState::Ready)
    }

    /// READY/DONE/FAILED/NOT_READY → SENDING
    ///
    /// Also accepted from SENDING/COLLECTING: the owner serialises commands,
    /// so those states can only be left behind by an abandoned command.
    pub fn begin_send(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        match *state {
            ChannelState::Idle | ChannelState::Closed => Err(Error::SessionNotOpen),
            ChannelState::Ready
            | ChannelState::Done
            | ChannelState::Failed
            | ChannelState::NotReady => {
                *state = ChannelState::Sending;
                Ok(())
            }
            abandoned @ (ChannelState::Sending | ChannelState::Collecting) => {
                warn!("Previous command abandoned while {:?}, resynchronising", abandoned);
                *state = ChannelState::Sending;
                Ok(())
            }
            other => Err(Error::InvalidSessionState(format!(
                "Cannot send from state: {:?}",
                other
            ))),
        }
    }

    /// SENDING → COLLECTING
    pub fn begin_collect(&self) -> Result<()> {
        self.transition(&[ChannelState::Sending], ChannelState::Collecting)?;
        self.inner.commands_sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// COLLECTING → DONE
    pub fn complete(&self) -> Result<()> {
        self.transition(&[ChannelState::Collecting], ChannelState::Done)
    }

    /// COLLECTING → FAILED (timeout, device rejection)
    pub fn fail(&self) -> Result<()> {
        self.transition(&[ChannelState::Collecting], ChannelState::Failed)
    }

    /// Any open state → NOT_READY
    pub fn mark_not_ready(&self) {
        let mut state = self.inner.state.write();
        if !matches!(*state, ChannelState::Idle | ChannelState::Closed) {
            *state = ChannelState::NotReady;
        }
    }

    /// Close session
    pub fn close(&self) {
        *self.inner.state.write() = ChannelState::Closed;
    }

    fn transition(&self, from: &[ChannelState], to: ChannelState) -> Result<()> {
        let mut state = self.inner.state.write();

        if !from.contains(&*state) {
            return Err(Error::InvalidSessionState(format!(
                "Cannot move from {:?} to {:?}",
                *state, to
            )));
        }

        *state = to;
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
