//! Scripted in-memory transport
//!
//! Replays canned device lines on the tokio clock. Combined with a paused
//! runtime (`#[tokio::test(start_paused = true)]`) this gives deterministic
//! timing for idle-gap and timeout behaviour.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

use crate::{error::*, ReadOutcome, Transport};

/// One scripted device event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Emit `text` after `after` (relative to the previous event)
    Line { after: Duration, text: String },

    /// Bytes of a line still in transit after `after`
    Partial { after: Duration },

    /// Break the link after `after`
    Fail { after: Duration, message: String },
}

impl Scripted {
    /// Line delivered right after the previous event
    pub fn line(text: impl Into<String>) -> Self {
        Self::delayed(Duration::ZERO, text)
    }

    /// Line delivered `after` the previous event
    pub fn delayed(after: Duration, text: impl Into<String>) -> Self {
        Self::Line {
            after,
            text: text.into(),
        }
    }

    /// Unterminated bytes `after` the previous event
    pub fn partial(after: Duration) -> Self {
        Self::Partial { after }
    }

    /// Link failure `after` the previous event
    pub fn fail(after: Duration, message: impl Into<String>) -> Self {
        Self::Fail {
            after,
            message: message.into(),
        }
    }

    fn after(&self) -> Duration {
        match self {
            Self::Line { after, .. } | Self::Partial { after } | Self::Fail { after, .. } => *after,
        }
    }
}

#[derive(Debug, Clone)]
enum Event {
    Line(String),
    Partial,
    Fail(String),
}

#[derive(Debug, Default)]
struct Inner {
    open: bool,
    fail_open: Option<String>,
    boot: Vec<Scripted>,
    replies: VecDeque<Vec<Scripted>>,
    pending: VecDeque<(Instant, Event)>,
    written: Vec<String>,
    opens: usize,
    closes: usize,
}

impl Inner {
    fn schedule(&mut self, script: Vec<Scripted>) {
        let mut due = self
            .pending
            .back()
            .map_or_else(Instant::now, |(at, _)| *at)
            .max(Instant::now());

        for item in script {
            due += item.after();
            let event = match item {
                Scripted::Line { text, .. } => Event::Line(text),
                Scripted::Partial { .. } => Event::Partial,
                Scripted::Fail { message, .. } => Event::Fail(message),
            };
            self.pending.push_back((due, event));
        }
    }
}

/// Transport whose device side is a script
///
/// Cloning yields another handle to the same script, so a test can keep
/// one handle for assertions while the protocol owns the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines the device emits right after the channel opens
    pub fn with_boot(self, boot: Vec<Scripted>) -> Self {
        self.inner.lock().boot = boot;
        self
    }

    /// Queue the reply to the next unanswered `write_line`
    pub fn reply(&self, script: Vec<Scripted>) -> &Self {
        self.inner.lock().replies.push_back(script);
        self
    }

    /// Queue a reply consisting of immediate lines
    pub fn reply_lines(&self, lines: &[&str]) -> &Self {
        self.reply(lines.iter().map(|l| Scripted::line(*l)).collect())
    }

    /// Make the device emit lines now, outside any command
    pub fn inject(&self, script: Vec<Scripted>) {
        self.inner.lock().schedule(script);
    }

    /// Make `open` fail with [`Error::Unavailable`]
    pub fn set_fail_open(&self, message: Option<&str>) {
        self.inner.lock().fail_open = message.map(str::to_string);
    }

    /// Lines written so far
    pub fn written(&self) -> Vec<String> {
        self.inner.lock().written.clone()
    }

    /// Number of successful opens
    pub fn opens(&self) -> usize {
        self.inner.lock().opens
    }

    /// Number of closes
    pub fn closes(&self) -> usize {
        self.inner.lock().closes
    }

    /// Events scheduled but not yet read
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();

        if let Some(message) = inner.fail_open.clone() {
            return Err(Error::Unavailable(message));
        }

        inner.open = true;
        inner.opens += 1;
        inner.pending.clear();

        let boot = inner.boot.clone();
        inner.schedule(boot);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.open {
            inner.open = false;
            inner.closes += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.open {
            return Err(Error::NotOpen);
        }

        trace!("Scripted device received {:?}", line);
        inner.written.push(line.to_string());

        if let Some(script) = inner.replies.pop_front() {
            inner.schedule(script);
        }
        Ok(())
    }

    async fn read_line(&mut self, deadline: Instant) -> Result<ReadOutcome> {
        let next = {
            let mut inner = self.inner.lock();
            if !inner.open {
                return Err(Error::NotOpen);
            }

            match inner.pending.front() {
                Some((due, _)) if *due <= deadline => inner.pending.pop_front(),
                _ => None,
            }
        };

        match next {
            Some((due, event)) => {
                sleep_until(due).await;
                match event {
                    Event::Line(text) => Ok(ReadOutcome::Line(text)),
                    Event::Partial => Ok(ReadOutcome::Partial),
                    Event::Fail(message) => Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        message,
                    ))),
                }
            }
            None => {
                sleep_until(deadline).await;
                Ok(ReadOutcome::Idle)
            }
        }
    }

    async fn drain_stale(&mut self) -> Result<usize> {
        let mut inner = self.inner.lock();
        if !inner.open {
            return Err(Error::NotOpen);
        }

        let now = Instant::now();
        let mut dropped = 0;
        while inner.pending.front().is_some_and(|(due, _)| *due <= now) {
            inner.pending.pop_front();
            dropped += 1;
        }
        Ok(dropped)
    }

    fn remote_addr(&self) -> String {
        "scripted".to_string()
    }
}
