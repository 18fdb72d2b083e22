//! Error types for fingerlink-core

/// Result type alias for fingerlink-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Line carries a terminal marker but its fields do not parse
    #[error("Malformed terminal line for {command}: {line:?}")]
    MalformedTerminal {
        command: crate::command::Command,
        line: String,
    },

    /// Channel state machine refused a transition
    #[error("Invalid channel state: {0}")]
    InvalidSessionState(String),

    /// Command issued before the channel was opened
    #[error("Channel not open - open the device first")]
    SessionNotOpen,

    /// Template payload could not be decoded
    #[error("Template error: {0}")]
    Template(#[from] fingerlink_types::Error),
}

impl Error {
    /// Check if error requires reopening the channel
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::SessionNotOpen | Self::InvalidSessionState(_)
        )
    }
}
