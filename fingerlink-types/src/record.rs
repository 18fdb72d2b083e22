//! Device readings and stored records

use std::fmt;

use chrono::{DateTime, Utc};

use crate::template::Template;

/// Template count read from the sensor at a point in time
///
/// Only used to reconcile ambiguous enrollments; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub template_count: u32,
    pub taken_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn new(template_count: u32) -> Self {
        Self {
            template_count,
            taken_at: Utc::now(),
        }
    }
}

/// RFID card read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardScan {
    /// Card UID as reported by the reader
    pub uid: String,
    pub scanned_at: DateTime<Utc>,
}

impl CardScan {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            scanned_at: Utc::now(),
        }
    }
}

impl fmt::Display for CardScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Card[UID: {}]", self.uid)
    }
}

/// Template reference handed to the matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTemplate {
    pub id: u32,

    /// Hex wire form, as it was stored (may be malformed)
    pub hex: String,
}

impl StoredTemplate {
    pub fn new(id: u32, hex: impl Into<String>) -> Self {
        Self { id, hex: hex.into() }
    }
}

/// Enrolled fingerprint as kept by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    /// Sensor slot
    pub sensor_id: u32,

    pub template: Option<Template>,

    pub active: bool,

    pub enrolled_at: DateTime<Utc>,
}

impl FingerprintRecord {
    pub fn new(sensor_id: u32, template: Option<Template>) -> Self {
        Self {
            sensor_id,
            template,
            active: true,
            enrolled_at: Utc::now(),
        }
    }

    /// Matcher input for this record, if it carries a template
    pub fn stored_template(&self) -> Option<StoredTemplate> {
        self.template
            .as_ref()
            .map(|t| StoredTemplate::new(self.sensor_id, t.to_hex()))
    }
}
