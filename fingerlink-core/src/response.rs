//! Response lines and collected command results

use std::fmt;
use std::time::Duration;

use fingerlink_types::Template;

use crate::command::Command;
use crate::dialect;

/// Definitive result carried by a terminal line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// Link check answered
    Pong,

    /// Operation completed (delete, empty, ...)
    Success(String),

    /// Device reported an explicit error
    Rejected(String),

    /// Verification found no matching template
    NotFound,

    /// Newly assigned template id
    Id(u32),

    /// Stored template count
    Count(u32),

    /// Verification matched a stored template
    Match { id: u32, confidence: u16 },

    /// Captured template
    Template(Template),

    /// RFID card UID
    Card(String),
}

impl Terminal {
    /// Check if this terminal is an explicit device error
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Check if this terminal can complete `command`
    ///
    /// Errors can end any command; everything else belongs to one command
    /// (or, for `Success`, to the database maintenance commands).
    pub fn answers(&self, command: Command) -> bool {
        match self {
            Self::Rejected(_) => true,
            Self::Pong => command == Command::Ping,
            Self::Count(_) => command == Command::Count,
            Self::Id(_) => command == Command::Enroll,
            Self::Match { .. } | Self::NotFound => command == Command::Verify,
            Self::Template(_) => command == Command::Capture,
            Self::Card(_) => command == Command::ScanCard,
            Self::Success(_) => matches!(command, Command::Delete(_) | Command::Empty),
        }
    }
}

/// Classification of a single received line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// Unsolicited noise (boot messages, handshake repeats), discarded
    Banner,

    /// Progress message, retained but not final
    Continuation,

    /// Terminal line left over from an abandoned earlier command, discarded
    Stale(Terminal),

    /// Completion marker for the active dialect
    Terminal(Terminal),
}

/// Structured device reply, as delivered by request/response adapters
///
/// Rendered into dialect lines with [`crate::Dialect::render`] so that
/// every transport feeds the same line grammar into the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Pong,
    Count(u32),
    /// Delete or empty completed
    Done,
    Progress(String),
    Enrolled(u32),
    Match { id: u32, confidence: u16 },
    NoMatch,
    Template(Template),
    Card(String),
    Failed(String),
}

/// Lines retained for one command invocation plus its terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolResult {
    pub command: Command,

    /// Continuation lines and the terminal line, in arrival order
    pub lines: Vec<String>,

    pub terminal: Terminal,

    pub elapsed: Duration,
}

impl ProtocolResult {
    pub fn new(command: Command, lines: Vec<String>, terminal: Terminal, elapsed: Duration) -> Self {
        Self {
            command,
            lines,
            terminal,
            elapsed,
        }
    }

    /// Human-readable progress messages (template payload lines excluded)
    pub fn messages(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|line| dialect::template_payload(line).is_none())
            .cloned()
            .collect()
    }

    /// Template carried by this response, either as terminal or as a
    /// `TEMPLATE:` continuation line preceding it
    pub fn captured_template(&self) -> Option<Template> {
        if let Terminal::Template(template) = &self.terminal {
            return Some(template.clone());
        }

        self.lines
            .iter()
            .rev()
            .filter_map(|line| dialect::template_payload(line))
            .find_map(|hex| Template::from_hex(hex).ok())
    }
}

impl fmt::Display for ProtocolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Response[{}](lines={}, terminal={:?}, {}ms)",
            self.command,
            self.lines.len(),
            self.terminal,
            self.elapsed.as_millis()
        )
    }
}
