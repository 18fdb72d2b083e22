//! Device configuration
//!
//! ```toml
//! dialect = "compact"
//!
//! [transport]
//! kind = "serial"
//! port = "/dev/ttyUSB0"
//! baud_rate = 57600
//!
//! [timing]
//! progressive_ms = 45000
//! idle_gap_ms = 20000
//!
//! [matching]
//! threshold = 70
//! ```

use std::path::Path;
use std::time::Duration;

use fingerlink_core::constants::*;
use fingerlink_core::matcher::DEFAULT_THRESHOLD;
use fingerlink_core::{CommandKind, Dialect};
use fingerlink_transport::{HttpTransport, SerialTransport, TcpTransport, Transport};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Response grammar spoken by the firmware
    #[serde(default)]
    pub dialect: Dialect,

    pub transport: TransportConfig,

    #[serde(default)]
    pub timing: Timing,

    #[serde(default)]
    pub matching: MatchingConfig,
}

/// How to reach the terminal
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Serial {
        /// Port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
        port: String,

        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },

    /// Serial-over-TCP bridge
    Tcp { host: String, port: u16 },

    /// REST tunnel
    Http {
        base_url: String,

        #[serde(default = "default_connect_timeout_ms")]
        connect_timeout_ms: u64,
    },
}

/// Protocol timing, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Timing {
    pub handshake_ms: u64,
    pub quick_ms: u64,
    pub progressive_ms: u64,

    /// Maximum silence while collecting a response
    pub idle_gap_ms: u64,

    pub drain_window_ms: u64,
    pub retry_delay_ms: u64,

    /// Retries of idempotent quick commands (ping, count)
    pub max_retries: u32,

    /// Maximum wait for the channel behind other commands
    pub queue_wait_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum similarity (0..=100) accepted as a match
    pub threshold: u8,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            handshake_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            quick_ms: DEFAULT_QUICK_TIMEOUT_MS,
            progressive_ms: DEFAULT_PROGRESSIVE_TIMEOUT_MS,
            idle_gap_ms: DEFAULT_IDLE_GAP_MS,
            drain_window_ms: DEFAULT_DRAIN_WINDOW_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_retries: MAX_RETRIES,
            queue_wait_ms: DEFAULT_QUEUE_WAIT_MS,
        }
    }
}

impl Timing {
    pub fn handshake(&self) -> Duration {
        Duration::from_millis(self.handshake_ms)
    }

    /// Overall deadline for a command of the given tier
    pub fn command_timeout(&self, kind: CommandKind) -> Duration {
        match kind {
            CommandKind::Quick => Duration::from_millis(self.quick_ms),
            CommandKind::Progressive => Duration::from_millis(self.progressive_ms),
        }
    }

    pub fn idle_gap(&self) -> Duration {
        Duration::from_millis(self.idle_gap_ms)
    }

    pub fn drain_window(&self) -> Duration {
        Duration::from_millis(self.drain_window_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn queue_wait(&self) -> Duration {
        Duration::from_millis(self.queue_wait_ms)
    }

    /// Check timing invariants
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("handshake_ms", self.handshake_ms),
            ("quick_ms", self.quick_ms),
            ("progressive_ms", self.progressive_ms),
            ("idle_gap_ms", self.idle_gap_ms),
            ("drain_window_ms", self.drain_window_ms),
            ("queue_wait_ms", self.queue_wait_ms),
        ];

        if let Some((name, _)) = required.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("timing.{} must be greater than 0", name)));
        }

        if self.idle_gap_ms >= self.progressive_ms {
            return Err(Error::Config(format!(
                "timing.idle_gap_ms ({}) must be below timing.progressive_ms ({})",
                self.idle_gap_ms, self.progressive_ms
            )));
        }

        Ok(())
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl DeviceConfig {
    /// Configuration for a serial terminal with default timing
    pub fn serial(port: impl Into<String>) -> Self {
        Self {
            dialect: Dialect::default(),
            transport: TransportConfig::Serial {
                port: port.into(),
                baud_rate: DEFAULT_BAUD_RATE,
            },
            timing: Timing::default(),
            matching: MatchingConfig::default(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.timing.validate()?;

        if self.matching.threshold > 100 {
            return Err(Error::Config(format!(
                "matching.threshold ({}) must be at most 100",
                self.matching.threshold
            )));
        }

        match &self.transport {
            TransportConfig::Serial { port, baud_rate } => {
                if port.trim().is_empty() {
                    return Err(Error::Config("transport.port must not be empty".into()));
                }
                if *baud_rate == 0 {
                    return Err(Error::Config("transport.baud_rate must be greater than 0".into()));
                }
            }
            TransportConfig::Tcp { host, port } => {
                if host.trim().is_empty() || *port == 0 {
                    return Err(Error::Config("transport needs a host and a non-zero port".into()));
                }
            }
            TransportConfig::Http { base_url, .. } => {
                if base_url.trim().is_empty() {
                    return Err(Error::Config("transport.base_url must not be empty".into()));
                }
            }
        }

        Ok(())
    }

    /// Build the configured transport
    pub fn build_transport(&self) -> Box<dyn Transport> {
        let drain_window = self.timing.drain_window();

        match &self.transport {
            TransportConfig::Serial { port, baud_rate } => Box::new(
                SerialTransport::new(port.clone())
                    .with_baud_rate(*baud_rate)
                    .with_drain_window(drain_window),
            ),
            TransportConfig::Tcp { host, port } => {
                Box::new(TcpTransport::new(host.clone(), *port).with_drain_window(drain_window))
            }
            TransportConfig::Http {
                base_url,
                connect_timeout_ms,
            } => Box::new(
                HttpTransport::new(base_url.clone(), self.dialect)
                    .with_connect_timeout(Duration::from_millis(*connect_timeout_ms))
                    .with_request_timeouts(
                        self.timing.command_timeout(CommandKind::Quick),
                        self.timing.command_timeout(CommandKind::Progressive),
                    ),
            ),
        }
    }
}
