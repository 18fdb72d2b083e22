//! Verification results

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a verification, on the sensor or against stored templates
///
/// `confidence` is only meaningful when `found` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub found: bool,

    /// Sensor slot (or stored record) that matched
    pub template_id: Option<u32>,

    /// Similarity, 0..=100
    pub confidence: u8,
}

impl MatchResult {
    pub fn found(template_id: u32, confidence: u8) -> Self {
        Self {
            found: true,
            template_id: Some(template_id),
            confidence,
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            template_id: None,
            confidence: 0,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.template_id {
            Some(id) if self.found => {
                write!(f, "Match[id: {}, confidence: {}]", id, self.confidence)
            }
            _ => write!(f, "NoMatch"),
        }
    }
}
