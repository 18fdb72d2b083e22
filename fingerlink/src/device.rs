//! High-level device interface

use std::sync::Arc;

use async_trait::async_trait;
use fingerlink_core::dialect::template_payload;
use fingerlink_core::matcher::{self, DEFAULT_THRESHOLD};
use fingerlink_core::{ChannelState, Command, Dialect, ProtocolResult, Session, Terminal};
use fingerlink_transport::Transport;
use fingerlink_types::{
    CardScan, DeviceSnapshot, EnrollmentOutcome, FingerprintRecord, MatchResult, StoredTemplate,
    Template,
};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::{DeviceConfig, Timing};
use crate::error::{Error, Result};
use crate::protocol::{Progress, Protocol};
use crate::recovery::{EnrollPort, RecoveryCoordinator};
use crate::store::TemplateStore;

/// Fingerprint/RFID terminal
///
/// Cloning yields another handle to the same channel. Commands from all
/// handles are serialised: each waits its turn (first come, first served)
/// for at most the configured queue wait.
///
/// # Examples
///
/// ```no_run
/// use fingerlink::{Device, DeviceConfig};
///
/// #[tokio::main]
/// async fn main() -> fingerlink::Result<()> {
///     let device = Device::from_config(&DeviceConfig::serial("/dev/ttyUSB0"))?;
///     device.open().await?;
///
///     println!("{} templates stored", device.count().await?);
///
///     let outcome = device.enroll().await?;
///     println!("{}", outcome);
///
///     device.close().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Device {
    protocol: Arc<Mutex<Protocol>>,
    session: Session,
    timing: Timing,
    threshold: u8,
}

impl Device {
    /// Create a device over an unopened transport
    pub fn new(transport: Box<dyn Transport>, dialect: Dialect, timing: Timing) -> Self {
        let protocol = Protocol::new(transport, dialect, timing);
        let session = protocol.session().clone();

        Self {
            protocol: Arc::new(Mutex::new(protocol)),
            session,
            timing,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Create a device from validated configuration
    pub fn from_config(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self::new(config.build_transport(), config.dialect, config.timing)
            .with_threshold(config.matching.threshold))
    }

    /// Set similarity threshold for store verification
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold.min(100);
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Get channel state without waiting for the in-flight command
    pub fn state(&self) -> ChannelState {
        self.session.state()
    }

    /// Check if the channel is open
    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    /// Open the channel
    pub async fn open(&self) -> Result<()> {
        self.acquire(Command::Ping).await?.open().await
    }

    /// Close the channel
    pub async fn close(&self) -> Result<()> {
        self.acquire(Command::Ping).await?.close().await
    }

    async fn acquire(&self, command: Command) -> Result<tokio::sync::MutexGuard<'_, Protocol>> {
        let wait = self.timing.queue_wait();

        timeout(wait, self.protocol.lock()).await.map_err(|_| {
            warn!("{} gave up waiting {}ms for the channel", command, wait.as_millis());
            Error::ProtocolTimeout {
                command,
                elapsed: wait,
                idle: false,
                lines: Vec::new(),
            }
        })
    }

    /// Run one command once
    async fn run(&self, command: Command, progress: Option<Progress<'_>>) -> Result<ProtocolResult> {
        let mut protocol = self.acquire(command).await?;
        protocol.execute(command, progress).await
    }

    /// Run a quick command, retrying idempotent ones after transient failures
    async fn run_quick(&self, command: Command) -> Result<ProtocolResult> {
        let mut attempt = 0;

        loop {
            match self.run(command, None).await {
                Err(e) if command.is_idempotent() && e.is_transient() && attempt < self.timing.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retry {}/{}",
                        command, e, attempt, self.timing.max_retries
                    );
                    sleep(self.timing.retry_delay()).await;
                }
                result => return result,
            }
        }
    }

    /// Check the link
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<()> {
        let result = self.run_quick(Command::Ping).await?;

        match result.terminal {
            Terminal::Pong => Ok(()),
            other => Err(unexpected(Command::Ping, &other)),
        }
    }

    /// Number of templates stored on the sensor
    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<u32> {
        let result = self.run_quick(Command::Count).await?;

        match result.terminal {
            Terminal::Count(count) => {
                debug!("Sensor holds {} templates", count);
                Ok(count)
            }
            other => Err(unexpected(Command::Count, &other)),
        }
    }

    /// Template count with the time it was read
    pub async fn snapshot(&self) -> Result<DeviceSnapshot> {
        Ok(DeviceSnapshot::new(self.count().await?))
    }

    /// Delete the template in one sensor slot (never retried)
    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: u32) -> Result<()> {
        let result = self.run_quick(Command::Delete(id)).await?;

        match result.terminal {
            Terminal::Success(_) => {
                info!("Deleted template {}", id);
                Ok(())
            }
            other => Err(unexpected(Command::Delete(id), &other)),
        }
    }

    /// Delete every template on the sensor (never retried)
    #[instrument(skip(self))]
    pub async fn empty_all(&self) -> Result<()> {
        let result = self.run_quick(Command::Empty).await?;

        match result.terminal {
            Terminal::Success(_) => {
                info!("Sensor database emptied");
                Ok(())
            }
            other => Err(unexpected(Command::Empty, &other)),
        }
    }

    /// Read one RFID card
    #[instrument(skip(self))]
    pub async fn scan_card(&self) -> Result<CardScan> {
        let result = self.run_quick(Command::ScanCard).await?;

        match result.terminal {
            Terminal::Card(uid) => {
                info!("Card detected: {}", uid);
                Ok(CardScan::new(uid))
            }
            other => Err(unexpected(Command::ScanCard, &other)),
        }
    }

    /// Enroll a finger, recovering silent successes
    #[instrument(skip(self))]
    pub async fn enroll(&self) -> Result<EnrollmentOutcome> {
        let port = DevicePort {
            device: self,
            updates: None,
        };
        let outcome = RecoveryCoordinator::new(port).enroll().await?;
        info!("{}", outcome);
        Ok(outcome)
    }

    /// Enroll a finger, publishing a `PROCESSING` snapshot for every progress
    /// message and a final snapshot with the result
    pub async fn enroll_with_progress(
        &self,
        updates: mpsc::UnboundedSender<EnrollmentOutcome>,
    ) -> Result<EnrollmentOutcome> {
        let port = DevicePort {
            device: self,
            updates: Some(updates.clone()),
        };

        match RecoveryCoordinator::new(port).enroll().await {
            Ok(outcome) => {
                let _ = updates.send(outcome.clone());
                info!("{}", outcome);
                Ok(outcome)
            }
            Err(e) => {
                let mut messages = e.lines().to_vec();
                messages.push(e.to_string());
                let _ = updates.send(EnrollmentOutcome::failed(messages));
                Err(e)
            }
        }
    }

    /// Verify a finger against the sensor's own database
    #[instrument(skip(self))]
    pub async fn verify_against_device(&self) -> Result<MatchResult> {
        let result = self.run(Command::Verify, None).await?;

        let matched = match result.terminal {
            Terminal::Match { id, confidence } => {
                MatchResult::found(id, confidence.min(100) as u8)
            }
            Terminal::NotFound => MatchResult::not_found(),
            other => return Err(unexpected(Command::Verify, &other)),
        };

        info!("{}", matched);
        Ok(matched)
    }

    /// Capture a raw template without storing it on the sensor
    #[instrument(skip(self))]
    pub async fn capture_template(&self) -> Result<Template> {
        let result = self.run(Command::Capture, None).await?;

        result
            .captured_template()
            .ok_or_else(|| unexpected(Command::Capture, &result.terminal))
    }

    /// Capture a template and find the best stored match at or above the
    /// configured threshold
    #[instrument(skip(self, stored), fields(candidates = stored.len()))]
    pub async fn verify_against_store(&self, stored: &[StoredTemplate]) -> Result<MatchResult> {
        let candidate = self.capture_template().await?;

        let matched = matcher::best_match(&candidate.to_hex(), stored, self.threshold);
        info!("{}", matched);
        Ok(matched)
    }

    /// Enroll and record the result in `store`
    pub async fn enroll_into(&self, store: &dyn TemplateStore) -> Result<EnrollmentOutcome> {
        let outcome = self.enroll().await?;

        if let Some(id) = outcome.assigned_id {
            store
                .insert(FingerprintRecord::new(id, outcome.template.clone()))
                .await?;
        }

        Ok(outcome)
    }

    /// Delete from the sensor (best effort) and from `store`
    ///
    /// Returns whether the store held the record.
    pub async fn delete_from(&self, store: &dyn TemplateStore, id: u32) -> Result<bool> {
        if let Err(e) = self.delete_by_id(id).await {
            warn!("Sensor delete of {} failed, removing record anyway: {}", id, e);
        }

        store.remove(id).await
    }

    /// Empty the sensor (best effort) and `store`
    pub async fn empty_with(&self, store: &dyn TemplateStore) -> Result<()> {
        if let Err(e) = self.empty_all().await {
            warn!("Sensor empty failed, clearing records anyway: {}", e);
        }

        store.clear().await
    }

    /// Verify against every active template in `store`
    pub async fn verify_with_store(&self, store: &dyn TemplateStore) -> Result<MatchResult> {
        let stored = store.active_templates().await?;
        self.verify_against_store(&stored).await
    }
}

fn unexpected(command: Command, terminal: &Terminal) -> Error {
    Error::InvalidResponse(format!("{} answered with {:?}", command, terminal))
}

/// Device as seen by the recovery coordinator
struct DevicePort<'a> {
    device: &'a Device,
    updates: Option<mpsc::UnboundedSender<EnrollmentOutcome>>,
}

#[async_trait]
impl EnrollPort for DevicePort<'_> {
    async fn snapshot(&self) -> Result<DeviceSnapshot> {
        self.device.snapshot().await
    }

    async fn enroll(&self) -> Result<ProtocolResult> {
        let Some(updates) = &self.updates else {
            return self.device.run(Command::Enroll, None).await;
        };

        let started = Instant::now();
        let messages = parking_lot::Mutex::new(Vec::new());
        let progress = |line: &str| {
            if template_payload(line).is_some() {
                return;
            }
            let mut messages = messages.lock();
            messages.push(line.to_string());
            let _ = updates.send(EnrollmentOutcome::processing(messages.clone()));
        };

        let result = self.device.run(Command::Enroll, Some(&progress)).await;
        debug!("Enroll finished after {}ms", started.elapsed().as_millis());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTemplateStore;
    use fingerlink_transport::mock::Scripted;
    use fingerlink_transport::ScriptedTransport;
    use fingerlink_types::EnrollmentStatus;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn timing() -> Timing {
        Timing {
            handshake_ms: 100,
            ..Timing::default()
        }
    }

    async fn opened(dialect: Dialect) -> (Device, ScriptedTransport) {
        let script = ScriptedTransport::new();
        let device = Device::new(Box::new(script.clone()), dialect, timing());
        device.open().await.unwrap();
        (device, script)
    }

    fn pattern() -> Vec<u8> {
        (0..Template::SIZE).map(|i| ((i * 37 + 11) % 256) as u8).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_end_to_end() {
        let (device, script) = opened(Dialect::Verbose).await;

        script.reply_lines(&["Sensor contains 4 templates"]);
        script.reply_lines(&["Place finger", "Remove finger", "Place again", "5"]);

        let outcome = device.enroll().await.unwrap();

        assert_eq!(outcome.status, EnrollmentStatus::Success);
        assert_eq!(outcome.assigned_id, Some(5));
        assert!(!outcome.recovered);
        assert_eq!(script.written(), vec!["COUNT", "ENROLL"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_recovers_after_link_failure() {
        let (device, script) = opened(Dialect::Compact).await;

        script.reply_lines(&["COUNT:3"]);
        script.reply(vec![
            Scripted::line("Place finger"),
            Scripted::fail(ms(500), "device reset"),
        ]);
        script.reply_lines(&["COUNT:4"]);

        let outcome = device.enroll().await.unwrap();

        assert_eq!(outcome.assigned_id, Some(4));
        assert!(outcome.recovered);
        assert!(outcome.messages.iter().any(|m| m.contains("device reset")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_recovers_when_id_arrives_late() {
        let (device, script) = opened(Dialect::Verbose).await;

        script.reply_lines(&["Sensor contains 3 templates"]);
        script.reply(vec![Scripted::line("Place finger"), Scripted::delayed(ms(31_000), "4")]);
        script.reply_lines(&["Sensor contains 4 templates"]);

        let outcome = device.enroll().await.unwrap();

        assert_eq!(outcome.assigned_id, Some(4));
        assert!(outcome.recovered);
        assert!(outcome.messages.iter().any(|m| m.contains("idle gap")));
        assert_eq!(script.written(), vec!["COUNT", "ENROLL", "COUNT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_without_recovery_keeps_error() {
        let (device, script) = opened(Dialect::Compact).await;

        script.reply_lines(&["COUNT:3"]);
        script.reply_lines(&["Place finger", "ERROR:Fingerprints did not match"]);
        script.reply_lines(&["COUNT:3"]);

        let err = device.enroll().await.unwrap_err();
        assert!(matches!(err, Error::DeviceRejected { .. }));
        assert_eq!(script.written(), vec!["COUNT", "ENROLL", "COUNT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enroll_with_progress_publishes_snapshots() {
        let (device, script) = opened(Dialect::Verbose).await;

        script.reply_lines(&["Sensor contains 0 templates"]);
        script.reply(vec![
            Scripted::line("Place finger"),
            Scripted::delayed(ms(2_000), "Remove finger"),
            Scripted::delayed(ms(2_000), "1"),
        ]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = device.enroll_with_progress(tx).await.unwrap();
        assert_eq!(outcome.assigned_id, Some(1));

        let mut snapshots = Vec::new();
        while let Ok(snapshot) = rx.try_recv() {
            snapshots.push(snapshot);
        }

        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].status, EnrollmentStatus::Processing);
        assert_eq!(snapshots[1].messages, vec!["Place finger", "Remove finger"]);
        assert!(snapshots[2].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_retried_after_timeout() {
        let (device, script) = opened(Dialect::Verbose).await;

        // First answer misses the 5s deadline and is drained before the retry
        script.reply(vec![Scripted::delayed(ms(5_200), "Sensor contains 8 templates")]);
        script.reply_lines(&["Sensor contains 7 templates"]);

        assert_eq!(device.count().await.unwrap(), 7);
        assert_eq!(script.written(), vec!["COUNT", "COUNT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let (device, script) = opened(Dialect::Verbose).await;

        let err = device.ping().await.unwrap_err();
        assert!(matches!(err, Error::ProtocolTimeout { .. }));
        assert_eq!(
            script.written().len(),
            1 + fingerlink_core::constants::MAX_RETRIES as usize
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_never_retried() {
        let (device, script) = opened(Dialect::Verbose).await;

        assert!(device.delete_by_id(3).await.is_err());
        assert_eq!(script.written(), vec!["DELETE 3"]);

        script.reply_lines(&["Deleted!"]);
        device.delete_by_id(3).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_against_device() {
        let (device, script) = opened(Dialect::Verbose).await;

        script.reply_lines(&["Waiting for finger", "Found ID #5 with confidence of 80"]);
        assert_eq!(device.verify_against_device().await.unwrap(), MatchResult::found(5, 80));

        script.reply_lines(&["Did not find a match"]);
        assert_eq!(device.verify_against_device().await.unwrap(), MatchResult::not_found());

        script.reply_lines(&["VERIFIED:1:2"]);
        assert!(device.verify_against_device().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confidence_clamped() {
        let (device, script) = opened(Dialect::Compact).await;

        script.reply_lines(&["VERIFIED:2:180"]);
        assert_eq!(device.verify_against_device().await.unwrap(), MatchResult::found(2, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_card() {
        let (device, script) = opened(Dialect::Verbose).await;

        script.reply_lines(&["Card UID: 04 A1 B2 C3"]);
        assert_eq!(device.scan_card().await.unwrap().uid, "04 A1 B2 C3");

        script.reply_lines(&["No card detected"]);
        assert!(matches!(device.scan_card().await, Err(Error::DeviceRejected { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_against_store() {
        let (device, script) = opened(Dialect::Compact).await;
        let sample = pattern();

        let store = MemoryTemplateStore::new();
        let mut other = sample.clone();
        other.reverse();
        store
            .insert(FingerprintRecord::new(1, Some(Template::from_bytes(&other).unwrap())))
            .await
            .unwrap();
        store
            .insert(FingerprintRecord::new(2, Some(Template::from_bytes(&sample).unwrap())))
            .await
            .unwrap();

        let line = format!("TEMPLATE:{}", hex::encode(&sample));
        script.reply_lines(&["Place finger", &line]);

        let matched = device.verify_with_store(&store).await.unwrap();
        assert_eq!(matched, MatchResult::found(2, 100));
        assert_eq!(script.written(), vec!["CAPTURE"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_combinations() {
        let (device, script) = opened(Dialect::Verbose).await;
        let store = MemoryTemplateStore::new();

        let line = format!("TEMPLATE:{}", hex::encode(pattern()));
        script.reply_lines(&["Sensor contains 1 templates"]);
        script.reply_lines(&["Place finger", &line, "2"]);

        let outcome = device.enroll_into(&store).await.unwrap();
        assert_eq!(outcome.assigned_id, Some(2));
        assert!(store.get(2).unwrap().template.is_some());

        // Sensor refuses, record is removed anyway
        script.reply_lines(&["Could not delete in that location"]);
        assert!(device.delete_from(&store, 2).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);

        script.reply_lines(&["Database emptied!"]);
        device.empty_with(&store).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_are_serialised() {
        let (device, script) = opened(Dialect::Verbose).await;

        script.reply(vec![Scripted::delayed(ms(10_000), "Did not find a match")]);
        script.reply_lines(&["PONG"]);

        let verifier = device.clone();
        let verify = tokio::spawn(async move { verifier.verify_against_device().await });

        // Let the verify take the channel first
        tokio::task::yield_now().await;
        sleep(ms(1)).await;

        let start = Instant::now();
        device.ping().await.unwrap();

        assert!(start.elapsed() >= ms(9_000));
        assert_eq!(verify.await.unwrap().unwrap(), MatchResult::not_found());
        assert_eq!(script.written(), vec!["VERIFY", "PING"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_wait_is_bounded() {
        let script = ScriptedTransport::new();
        let device = Device::new(
            Box::new(script.clone()),
            Dialect::Verbose,
            Timing {
                handshake_ms: 100,
                queue_wait_ms: 1_000,
                ..Timing::default()
            },
        );
        device.open().await.unwrap();

        script.reply(vec![Scripted::delayed(ms(10_000), "Did not find a match")]);

        let verifier = device.clone();
        let verify = tokio::spawn(async move { verifier.verify_against_device().await });
        tokio::task::yield_now().await;
        sleep(ms(1)).await;

        let err = device.count().await.unwrap_err();
        assert!(matches!(err, Error::ProtocolTimeout { command: Command::Count, .. }));
        assert!(verify.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_command_does_not_wedge_device() {
        let (device, script) = opened(Dialect::Verbose).await;

        script.reply(vec![Scripted::delayed(ms(20_000), "Did not find a match")]);
        let abandoned = timeout(ms(1_000), device.verify_against_device()).await;
        assert!(abandoned.is_err());

        sleep(ms(20_000)).await;

        script.reply_lines(&["PONG"]);
        device.ping().await.unwrap();
        assert_eq!(device.state(), ChannelState::Done);
        assert_eq!(script.written(), vec!["VERIFY", "PING"]);
    }

    #[tokio::test]
    async fn test_operations_require_open() {
        let device = Device::new(Box::new(ScriptedTransport::new()), Dialect::Verbose, timing());
        assert!(matches!(device.ping().await, Err(Error::NotConnected)));
        assert!(!device.is_open());
    }

    // Hardware tests need a terminal on /dev/ttyUSB0

    #[tokio::test]
    #[ignore] // Only run with real device
    async fn test_device_ping_hardware() {
        let device = Device::from_config(&DeviceConfig::serial("/dev/ttyUSB0")).unwrap();

        device.open().await.unwrap();
        device.ping().await.unwrap();
        println!("{} templates", device.count().await.unwrap());

        device.close().await.unwrap();
        assert!(!device.is_open());
    }
}
