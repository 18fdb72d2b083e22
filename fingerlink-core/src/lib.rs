//! # fingerlink-core
//!
//! Core protocol implementation for fingerprint/RFID access terminals.
//!
//! This crate provides the transport-independent primitives:
//! - Command definitions and timeout tiers
//! - Response dialects and line classification
//! - Channel state tracking
//! - Template similarity scoring
//! - Protocol constants

pub mod command;
pub mod constants;
pub mod dialect;
pub mod error;
pub mod matcher;
pub mod response;
pub mod session;

pub use command::{Command, CommandKind};
pub use dialect::Dialect;
pub use error::{Error, Result};
pub use response::{LineClass, ProtocolResult, Reply, Terminal};
pub use session::{ChannelState, Session};

/// Protocol version information
pub const PROTOCOL_VERSION: &str = "1.0";
