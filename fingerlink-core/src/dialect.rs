//! Device response dialects
//!
//! Terminal firmwares speak one of two line grammars. A deployment picks
//! exactly one; a channel never mixes them.
//!
//! ```text
//!               verbose                                compact
//! PING      →   PONG                                   PONG
//! COUNT     →   Sensor contains <N> templates          COUNT:<n>
//! DELETE n  →   Deleted!                               SUCCESS:<msg> | ERROR:<msg>
//! EMPTY     →   Database emptied!                      SUCCESS:<msg> | ERROR:<msg>
//! ENROLL    →   ... <id>                               ... SUCCESS:<id> | ERROR:<msg>
//! VERIFY    →   ... Found ID #<id> with confidence     ... VERIFIED:<id>:<c> | NOT_FOUND
//!                   of <c> | Did not find a match
//! CAPTURE   →   ... TEMPLATE:<hex>                     ... TEMPLATE:<hex>
//! SCAN      →   Card UID: <uid> | No card detected     CARD:<uid> | ERROR:<msg>
//! ```

use std::fmt;
use std::str::FromStr;

use fingerlink_types::Template;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::response::{LineClass, Reply, Terminal};

/// Prefix of a line carrying a raw template
pub const TEMPLATE_PREFIX: &str = "TEMPLATE:";

/// Lines the firmware prints on boot or sensor detection
const BANNERS: &[&str] = &["SENSOR_OK", "SENSOR_NOT_FOUND"];

/// Verbose progress line that looks final but is not
const WAITING_FOR_FINGER: &str = "Waiting for finger";

/// Verbose explicit failure lines
const VERBOSE_FAILURES: &[&str] = &[
    "Could not clear database",
    "Could not delete in that location",
    "No finger detected",
    "Image too messy",
    "Unknown error",
    "Communication error",
    "Error writing to flash",
    "Could not store in that location",
    "Fingerprints did not match",
    "Could not find fingerprint features",
    "Imaging error",
    "No card detected",
];

const VERBOSE_ERROR_PREFIX: &str = "Error: ";
const VERBOSE_MATCH_PREFIX: &str = "Found ID #";
const VERBOSE_CARD_PREFIX: &str = "Card UID: ";

/// Get template hex carried by a line, if any
pub fn template_payload(line: &str) -> Option<&str> {
    line.strip_prefix(TEMPLATE_PREFIX).map(str::trim)
}

/// Response grammar spoken by the device
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Human-readable sentences (`Found ID #3 with confidence of 80`)
    #[default]
    Verbose,

    /// Tagged tokens (`VERIFIED:3:80`)
    Compact,
}

impl Dialect {
    /// Get dialect name
    pub fn name(self) -> &'static str {
        match self {
            Self::Verbose => "verbose",
            Self::Compact => "compact",
        }
    }

    /// Check if a line is the "ready" sentinel sent after the device boots
    pub fn is_ready_sentinel(self, line: &str) -> bool {
        match self {
            Self::Verbose => line.starts_with("READY:"),
            Self::Compact => line == "READY" || line.starts_with("READY:"),
        }
    }

    /// Check if a line is unsolicited noise
    pub fn is_banner(self, line: &str) -> bool {
        self.is_ready_sentinel(line) || BANNERS.contains(&line)
    }

    /// Classify a trimmed, non-empty line received while `command` is active
    ///
    /// A terminal that cannot complete `command` (a late enroll id arriving
    /// while `COUNT` runs, say) is reported as [`LineClass::Stale`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedTerminal`] when a line carries a terminal
    /// marker whose fields do not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerlink_core::{Command, Dialect, LineClass, Terminal};
    ///
    /// let class = Dialect::Verbose
    ///     .classify(Command::Verify, "Found ID #5 with confidence of 80")
    ///     .unwrap();
    /// assert_eq!(class, LineClass::Terminal(Terminal::Match { id: 5, confidence: 80 }));
    /// ```
    pub fn classify(self, command: Command, line: &str) -> Result<LineClass> {
        if self.is_banner(line) {
            return Ok(LineClass::Banner);
        }

        if let Some(hex) = template_payload(line) {
            if command != Command::Capture {
                return Ok(LineClass::Continuation);
            }
            let template = Template::from_hex(hex).map_err(|_| malformed(command, line))?;
            return Ok(LineClass::Terminal(Terminal::Template(template)));
        }

        let terminal = match self {
            Self::Verbose => classify_verbose(command, line)?,
            Self::Compact => classify_compact(command, line)?,
        };

        Ok(match terminal {
            None => LineClass::Continuation,
            Some(terminal) if terminal.answers(command) => LineClass::Terminal(terminal),
            Some(terminal) => LineClass::Stale(terminal),
        })
    }

    /// Render a structured reply as the line this dialect would carry
    pub fn render(self, command: Command, reply: &Reply) -> String {
        match self {
            Self::Verbose => match reply {
                Reply::Pong => "PONG".to_string(),
                Reply::Count(n) => format!("Sensor contains {} templates", n),
                Reply::Done => match command {
                    Command::Empty => "Database emptied!".to_string(),
                    _ => "Deleted!".to_string(),
                },
                Reply::Progress(text) => text.clone(),
                Reply::Enrolled(id) => id.to_string(),
                Reply::Match { id, confidence } => {
                    format!("{}{} with confidence of {}", VERBOSE_MATCH_PREFIX, id, confidence)
                }
                Reply::NoMatch => "Did not find a match".to_string(),
                Reply::Template(template) => format!("{}{}", TEMPLATE_PREFIX, template.to_hex()),
                Reply::Card(uid) => format!("{}{}", VERBOSE_CARD_PREFIX, uid),
                Reply::Failed(message) if VERBOSE_FAILURES.contains(&message.as_str()) => {
                    message.clone()
                }
                Reply::Failed(message) => format!("{}{}", VERBOSE_ERROR_PREFIX, message),
            },
            Self::Compact => match reply {
                Reply::Pong => "PONG".to_string(),
                Reply::Count(n) => format!("COUNT:{}", n),
                Reply::Done => format!("SUCCESS:{}", command.name()),
                Reply::Progress(text) => text.clone(),
                Reply::Enrolled(id) => format!("SUCCESS:{}", id),
                Reply::Match { id, confidence } => format!("VERIFIED:{}:{}", id, confidence),
                Reply::NoMatch => "NOT_FOUND".to_string(),
                Reply::Template(template) => format!("{}{}", TEMPLATE_PREFIX, template.to_hex()),
                Reply::Card(uid) => format!("CARD:{}", uid),
                Reply::Failed(message) => format!("ERROR:{}", message),
            },
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verbose" => Ok(Self::Verbose),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown dialect: {}", other)),
        }
    }
}

fn malformed(command: Command, line: &str) -> Error {
    Error::MalformedTerminal {
        command,
        line: line.to_string(),
    }
}

fn classify_verbose(command: Command, line: &str) -> Result<Option<Terminal>> {
    if line == WAITING_FOR_FINGER {
        return Ok(None);
    }

    if line == "PONG" {
        return Ok(Some(Terminal::Pong));
    }

    if line == "Deleted!" || line == "Database emptied!" {
        return Ok(Some(Terminal::Success(line.to_string())));
    }

    if line == "Did not find a match" {
        return Ok(Some(Terminal::NotFound));
    }

    if VERBOSE_FAILURES.contains(&line) || line.starts_with(VERBOSE_ERROR_PREFIX) {
        return Ok(Some(Terminal::Rejected(line.to_string())));
    }

    if let Some(rest) = line.strip_prefix(VERBOSE_MATCH_PREFIX) {
        // "<id> with confidence of <c>"
        let mut parts = rest.split_whitespace();
        let id = parts.next().and_then(|s| s.parse().ok());
        let confidence = parts.nth(3).and_then(|s| s.parse().ok());

        return match (id, confidence) {
            (Some(id), Some(confidence)) => Ok(Some(Terminal::Match { id, confidence })),
            _ => Err(malformed(command, line)),
        };
    }

    if let Some(uid) = line.strip_prefix(VERBOSE_CARD_PREFIX) {
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(malformed(command, line));
        }
        return Ok(Some(Terminal::Card(uid.to_string())));
    }

    if line.contains(" templates") {
        // "Sensor contains <N> templates"
        let count = line
            .split_whitespace()
            .take_while(|word| *word != "templates")
            .last()
            .and_then(|word| word.parse().ok())
            .ok_or_else(|| malformed(command, line))?;
        return Ok(Some(Terminal::Count(count)));
    }

    if is_number(line) {
        let id = line.parse().map_err(|_| malformed(command, line))?;
        return Ok(Some(Terminal::Id(id)));
    }

    Ok(None)
}

fn classify_compact(command: Command, line: &str) -> Result<Option<Terminal>> {
    if line == "PONG" {
        return Ok(Some(Terminal::Pong));
    }

    if line == "NOT_FOUND" {
        return Ok(Some(Terminal::NotFound));
    }

    if let Some(rest) = line.strip_prefix("SUCCESS:") {
        if command == Command::Enroll {
            let digits: String = rest
                .trim()
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit())
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let id = digits.parse().map_err(|_| malformed(command, line))?;
            return Ok(Some(Terminal::Id(id)));
        }
        return Ok(Some(Terminal::Success(rest.trim().to_string())));
    }

    if let Some(rest) = line.strip_prefix("ERROR:") {
        return Ok(Some(Terminal::Rejected(rest.trim().to_string())));
    }

    if let Some(rest) = line.strip_prefix("VERIFIED:") {
        let mut parts = rest.split(':').map(str::trim);
        let id = parts.next().and_then(|s| s.parse().ok());
        let confidence = parts.next().and_then(|s| s.parse().ok());

        return match (id, confidence, parts.next()) {
            (Some(id), Some(confidence), None) => Ok(Some(Terminal::Match { id, confidence })),
            _ => Err(malformed(command, line)),
        };
    }

    if let Some(rest) = line.strip_prefix("COUNT:") {
        let count = rest.trim().parse().map_err(|_| malformed(command, line))?;
        return Ok(Some(Terminal::Count(count)));
    }

    if let Some(rest) = line.strip_prefix("CARD:") {
        let uid = rest.trim();
        if uid.is_empty() {
            return Err(malformed(command, line));
        }
        return Ok(Some(Terminal::Card(uid.to_string())));
    }

    Ok(None)
}

fn is_number(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}
