//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Not open")]
    NotOpen,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Device endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unsupported command: {0}")]
    Unsupported(String),
}

impl Error {
    /// Check if the medium could not be acquired at all
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::ConnectionTimeout | Self::InvalidAddress(_)
        )
    }
}
