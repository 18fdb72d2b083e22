//! Errors for fingerlink data types

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Value has the wrong shape (length, range)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Value could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}
