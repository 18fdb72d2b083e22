//! # fingerlink
//!
//! Drive fingerprint/RFID access terminals over a serial line, a TCP serial
//! bridge or an HTTP tunnel, and score fingerprint templates against each
//! other.
//!
//! ## Features
//!
//! - Half-duplex command protocol with per-tier deadlines and an idle-gap ceiling
//! - Verbose and compact device dialects
//! - Enrollment recovery when the link drops mid-operation
//! - Zone-weighted template matching
//!
//! ## Quick Start
//!
//! ```no_run
//! use fingerlink::{Device, DeviceConfig};
//!
//! #[tokio::main]
//! async fn main() -> fingerlink::Result<()> {
//!     let config = DeviceConfig::from_file("fingerlink.toml")?;
//!     let device = Device::from_config(&config)?;
//!     device.open().await?;
//!
//!     let matched = device.verify_against_device().await?;
//!     println!("{}", matched);
//!
//!     device.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod recovery;
pub mod store;

// Re-exports
pub use config::{DeviceConfig, MatchingConfig, Timing, TransportConfig};
pub use device::Device;
pub use error::{Error, Result};
pub use protocol::Protocol;
pub use recovery::{EnrollPort, RecoveryCoordinator};
pub use store::{MemoryTemplateStore, TemplateStore};

// Re-export types
pub use fingerlink_core::{matcher, ChannelState, Command, Dialect, ProtocolResult, Terminal};
pub use fingerlink_transport::Transport;
pub use fingerlink_types::{
    CardScan, DeviceSnapshot, EnrollmentOutcome, EnrollmentStatus, FingerprintRecord, MatchResult,
    StoredTemplate, Template,
};
