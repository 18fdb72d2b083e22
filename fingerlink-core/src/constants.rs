//! Protocol constants

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Wait for the "ready" sentinel after opening (milliseconds)
///
/// The sensor board can take up to three seconds to reboot when the
/// serial line is opened.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

/// Overall deadline for quick commands (milliseconds)
pub const DEFAULT_QUICK_TIMEOUT_MS: u64 = 5_000;

/// Overall deadline for progressive commands (milliseconds)
pub const DEFAULT_PROGRESSIVE_TIMEOUT_MS: u64 = 60_000;

/// Maximum silence while collecting a response (milliseconds)
pub const DEFAULT_IDLE_GAP_MS: u64 = 30_000;

/// Quiet period that ends a stale-byte drain (milliseconds)
pub const DEFAULT_DRAIN_WINDOW_MS: u64 = 10;

/// Delay between retries of idempotent quick commands (milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Maximum retries for idempotent quick commands
pub const MAX_RETRIES: u32 = 3;

/// Maximum wait for the channel while other commands are in flight (milliseconds)
pub const DEFAULT_QUEUE_WAIT_MS: u64 = 120_000;

/// Longest line accepted from the device (a template line is 1033 bytes)
pub const MAX_LINE_LENGTH: usize = 4096;
