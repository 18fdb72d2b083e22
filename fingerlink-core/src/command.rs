//! Terminal command definitions

use std::fmt;

/// Timeout tier of a command
///
/// Quick commands answer with a single terminal line within seconds.
/// Progressive commands drive a physical operation (finger placement,
/// card presentation) and stream progress lines for tens of seconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Quick,
    Progressive,
}

/// Commands understood by the terminal firmware
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    // Link
    Ping,

    // Template database
    Count,
    Delete(u32),
    Empty,

    // Finger interaction
    Enroll,
    Verify,
    Capture,

    // RFID reader
    ScanCard,
}

impl Command {
    /// Get timeout tier
    pub fn kind(self) -> CommandKind {
        match self {
            Self::Ping | Self::Count | Self::Delete(_) | Self::Empty | Self::ScanCard => {
                CommandKind::Quick
            }
            Self::Enroll | Self::Verify | Self::Capture => CommandKind::Progressive,
        }
    }

    /// Check if this command may be re-sent after a transient failure
    ///
    /// Only read-only commands qualify. Delete and empty change the sensor
    /// database and are reported as-is.
    pub fn is_idempotent(self) -> bool {
        matches!(self, Self::Ping | Self::Count)
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Count => "COUNT",
            Self::Delete(_) => "DELETE",
            Self::Empty => "EMPTY",
            Self::Enroll => "ENROLL",
            Self::Verify => "VERIFY",
            Self::Capture => "CAPTURE",
            Self::ScanCard => "SCAN",
        }
    }

    /// Line written to the device (without terminator)
    pub fn wire(self) -> String {
        match self {
            Self::Delete(id) => format!("{} {}", self.name(), id),
            _ => self.name().to_string(),
        }
    }

    /// Parse a command line as written on the wire
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let arg = parts.next();

        if parts.next().is_some() {
            return None;
        }

        match (name, arg) {
            ("PING", None) => Some(Self::Ping),
            ("COUNT", None) => Some(Self::Count),
            ("DELETE", Some(id)) => id.parse().ok().map(Self::Delete),
            ("EMPTY", None) => Some(Self::Empty),
            ("ENROLL", None) => Some(Self::Enroll),
            ("VERIFY", None) => Some(Self::Verify),
            ("CAPTURE", None) => Some(Self::Capture),
            ("SCAN", None) => Some(Self::ScanCard),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire() {
        assert_eq!(Command::Ping.wire(), "PING");
        assert_eq!(Command::Delete(12).wire(), "DELETE 12");
        assert_eq!(Command::ScanCard.wire(), "SCAN");
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("DELETE 7"), Some(Command::Delete(7)));
        assert_eq!(Command::parse("ENROLL"), Some(Command::Enroll));
        assert_eq!(Command::parse("DELETE"), None);
        assert_eq!(Command::parse("DELETE x"), None);
        assert_eq!(Command::parse("PING now"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_command_kind() {
        assert_eq!(Command::Count.kind(), CommandKind::Quick);
        assert_eq!(Command::Delete(1).kind(), CommandKind::Quick);
        assert_eq!(Command::Enroll.kind(), CommandKind::Progressive);
        assert_eq!(Command::Capture.kind(), CommandKind::Progressive);
    }

    #[test]
    fn test_command_idempotent() {
        assert!(Command::Ping.is_idempotent());
        assert!(Command::Count.is_idempotent());
        assert!(!Command::Delete(3).is_idempotent());
        assert!(!Command::Empty.is_idempotent());
        assert!(!Command::Enroll.is_idempotent());
    }
}
