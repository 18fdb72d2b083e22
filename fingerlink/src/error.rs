//! High-level error types

use std::time::Duration;

use fingerlink_core::Command;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Channel could not be opened
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// I/O failure while a command was in flight
    #[error("Transport failure: {message}")]
    TransportFailure { message: String, lines: Vec<String> },

    /// No terminal line within the applicable deadline
    #[error("{command} timed out after {}ms ({})", elapsed.as_millis(), if *idle { "idle gap" } else { "overall deadline" })]
    ProtocolTimeout {
        command: Command,
        elapsed: Duration,
        /// The idle-gap ceiling fired before the overall deadline
        idle: bool,
        lines: Vec<String>,
    },

    /// Device answered with an explicit error terminal
    #[error("Device rejected command: {message}")]
    DeviceRejected { message: String, lines: Vec<String> },

    /// Terminal line whose fields do not parse
    #[error("Malformed response from device: {message}")]
    MalformedResponse { message: String, lines: Vec<String> },

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Device not connected")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template store error: {0}")]
    Store(String),

    #[error("Core protocol error: {0}")]
    Core(#[from] fingerlink_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] fingerlink_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] fingerlink_types::Error),
}

impl Error {
    /// Check if a quick, idempotent command may be retried after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProtocolTimeout { .. } | Self::TransportFailure { .. })
    }

    /// Progress lines collected before the failure
    pub fn lines(&self) -> &[String] {
        match self {
            Self::TransportFailure { lines, .. }
            | Self::ProtocolTimeout { lines, .. }
            | Self::DeviceRejected { lines, .. }
            | Self::MalformedResponse { lines, .. } => lines,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = Error::ProtocolTimeout {
            command: Command::Count,
            elapsed: Duration::from_secs(5),
            idle: false,
            lines: vec![],
        };
        assert!(timeout.is_transient());

        let rejected = Error::DeviceRejected {
            message: "Could not delete in that location".into(),
            lines: vec!["Could not delete in that location".into()],
        };
        assert!(!rejected.is_transient());
        assert_eq!(rejected.lines().len(), 1);

        assert!(!Error::TransportUnavailable("busy".into()).is_transient());
        assert!(Error::NotConnected.lines().is_empty());
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::ProtocolTimeout {
            command: Command::Enroll,
            elapsed: Duration::from_millis(30_000),
            idle: true,
            lines: vec!["Place finger".into()],
        };
        assert_eq!(err.to_string(), "ENROLL timed out after 30000ms (idle gap)");
    }
}
