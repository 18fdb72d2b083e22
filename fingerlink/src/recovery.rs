//! Enrollment recovery
//!
//! A failed enroll (timeout, dropped link) does not prove the sensor did not
//! store the finger. The coordinator compares the template count before and
//! after the attempt:
//!
//! ```text
//! before = snapshot()     (failure tolerated: "unknown")
//! enroll()
//!   ok   → outcome with the device's id
//!   err  → before known and snapshot() > before  → SUCCESS, id = new count, recovered
//!          otherwise                          → original error, unchanged
//! ```
//!
//! The synthesized id assumes the device assigns slots densely in increasing
//! order and does not reuse freed slots while the enroll is in progress.

use async_trait::async_trait;
use fingerlink_core::{ProtocolResult, Terminal};
use fingerlink_types::{DeviceSnapshot, EnrollmentOutcome};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Device operations the coordinator needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrollPort: Send + Sync {
    /// Read the current number of stored templates
    async fn snapshot(&self) -> Result<DeviceSnapshot>;

    /// Run the progressive enroll command once
    async fn enroll(&self) -> Result<ProtocolResult>;
}

/// Enroll with count-based recovery
pub struct RecoveryCoordinator<P> {
    port: P,
}

impl<P: EnrollPort> RecoveryCoordinator<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub async fn enroll(&self) -> Result<EnrollmentOutcome> {
        let before = match self.port.snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Template count before enroll unknown: {}", e);
                None
            }
        };

        let error = match self.port.enroll().await {
            Ok(result) => return outcome(result),
            Err(e) => e,
        };

        let Some(before) = before else {
            debug!("No baseline count, reporting enroll failure as-is");
            return Err(error);
        };

        let after = match self.port.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Recovery check failed, count unavailable: {}", e);
                return Err(error);
            }
        };

        let (before, after) = (before.template_count, after.template_count);

        if after <= before {
            warn!(
                "Recovery check failed, template count unchanged ({} → {})",
                before, after
            );
            return Err(error);
        }

        info!(
            "Enroll recovered after '{}': template count {} → {}",
            error, before, after
        );

        let mut messages = error.lines().to_vec();
        messages.push(error.to_string());
        messages.push(format!(
            "Recovered: template count rose from {} to {}, assuming id {}",
            before, after, after
        ));

        let mut recovered = EnrollmentOutcome::success(after, messages);
        recovered.recovered = true;
        Ok(recovered)
    }
}

/// Translate a completed enroll response
pub(crate) fn outcome(result: ProtocolResult) -> Result<EnrollmentOutcome> {
    match result.terminal {
        Terminal::Id(id) => {
            let template = result.captured_template();
            Ok(EnrollmentOutcome::success(id, result.messages()).with_template(template))
        }
        ref other => Err(Error::InvalidResponse(format!(
            "enroll ended with {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fingerlink_core::Command;
    use fingerlink_types::{EnrollmentStatus, Template};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn link_dropped() -> Error {
        Error::TransportFailure {
            message: "broken pipe".into(),
            lines: vec!["Place finger".into(), "Remove finger".into()],
        }
    }

    fn counts(values: &'static [u32]) -> impl FnMut() -> Result<DeviceSnapshot> + Send {
        let mut calls = 0;
        move || {
            let value = values[calls];
            calls += 1;
            Ok(DeviceSnapshot::new(value))
        }
    }

    #[tokio::test]
    async fn test_direct_success() {
        let mut port = MockEnrollPort::new();
        port.expect_snapshot().times(1).returning(|| Ok(DeviceSnapshot::new(3)));
        port.expect_enroll().times(1).returning(|| {
            Ok(ProtocolResult::new(
                Command::Enroll,
                vec!["Place finger".into(), "Remove finger".into(), "Place again".into(), "5".into()],
                Terminal::Id(5),
                Duration::from_secs(12),
            ))
        });

        let outcome = RecoveryCoordinator::new(port).enroll().await.unwrap();

        assert_eq!(outcome.status, EnrollmentStatus::Success);
        assert_eq!(outcome.assigned_id, Some(5));
        assert!(!outcome.recovered);
        assert_eq!(outcome.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_recovers_when_count_increases() {
        let mut port = MockEnrollPort::new();
        port.expect_snapshot().times(2).returning(counts(&[3, 4]));
        port.expect_enroll().times(1).returning(|| Err(link_dropped()));

        let outcome = RecoveryCoordinator::new(port).enroll().await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.assigned_id, Some(4));
        assert!(outcome.recovered);
        assert!(outcome.messages.iter().any(|m| m.contains("broken pipe")));
        assert!(outcome.messages.iter().any(|m| m.starts_with("Recovered")));
        assert_eq!(outcome.messages[0], "Place finger");
    }

    #[tokio::test]
    async fn test_unchanged_count_propagates_original_error() {
        let mut port = MockEnrollPort::new();
        port.expect_snapshot().times(2).returning(counts(&[3, 3]));
        port.expect_enroll().times(1).returning(|| Err(link_dropped()));

        let err = RecoveryCoordinator::new(port).enroll().await.unwrap_err();

        match err {
            Error::TransportFailure { message, lines } => {
                assert_eq!(message, "broken pipe");
                assert_eq!(lines.len(), 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_recount_propagates_original_error() {
        let mut port = MockEnrollPort::new();
        let mut calls = 0;
        port.expect_snapshot().times(2).returning(move || {
            calls += 1;
            if calls == 1 { Ok(DeviceSnapshot::new(3)) } else { Err(Error::NotConnected) }
        });
        port.expect_enroll().times(1).returning(|| {
            Err(Error::ProtocolTimeout {
                command: Command::Enroll,
                elapsed: Duration::from_secs(30),
                idle: true,
                lines: vec![],
            })
        });

        let err = RecoveryCoordinator::new(port).enroll().await.unwrap_err();
        assert!(matches!(err, Error::ProtocolTimeout { idle: true, .. }));
    }

    #[tokio::test]
    async fn test_unknown_baseline_skips_recovery() {
        let mut port = MockEnrollPort::new();
        port.expect_snapshot().times(1).returning(|| Err(Error::NotConnected));
        port.expect_enroll().times(1).returning(|| Err(link_dropped()));

        let err = RecoveryCoordinator::new(port).enroll().await.unwrap_err();
        assert!(matches!(err, Error::TransportFailure { .. }));
    }

    #[test]
    fn test_outcome_carries_template() {
        let hex = "5a".repeat(Template::SIZE);
        let result = ProtocolResult::new(
            Command::Enroll,
            vec!["Place finger".into(), format!("TEMPLATE:{}", hex), "7".into()],
            Terminal::Id(7),
            Duration::ZERO,
        );

        let outcome = outcome(result).unwrap();
        assert_eq!(outcome.assigned_id, Some(7));
        assert_eq!(outcome.messages, vec!["Place finger", "7"]);
        assert_eq!(outcome.template.unwrap().to_hex(), hex.to_uppercase());
    }

    #[test]
    fn test_outcome_rejects_other_terminals() {
        let result = ProtocolResult::new(Command::Enroll, vec![], Terminal::Pong, Duration::ZERO);
        assert!(matches!(outcome(result), Err(Error::InvalidResponse(_))));
    }
}
