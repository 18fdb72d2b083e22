//! Enrollment outcome

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::template::Template;

/// Enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    /// Physical enrollment still under way
    Processing,

    /// Sensor stored the template
    Success,

    /// Enrollment failed
    Error,
}

/// Enrollment result reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentOutcome {
    pub status: EnrollmentStatus,

    /// Device progress messages, in arrival order
    pub messages: Vec<String>,

    /// Sensor slot assigned to the new template
    pub assigned_id: Option<u32>,

    /// Success was inferred from a template count increase after a failure
    pub recovered: bool,

    /// Raw template, when the device reported one
    pub template: Option<Template>,
}

impl EnrollmentOutcome {
    /// Snapshot of an enrollment that has not finished yet
    pub fn processing(messages: Vec<String>) -> Self {
        Self {
            status: EnrollmentStatus::Processing,
            messages,
            assigned_id: None,
            recovered: false,
            template: None,
        }
    }

    pub fn success(assigned_id: u32, messages: Vec<String>) -> Self {
        Self {
            status: EnrollmentStatus::Success,
            messages,
            assigned_id: Some(assigned_id),
            recovered: false,
            template: None,
        }
    }

    pub fn failed(messages: Vec<String>) -> Self {
        Self {
            status: EnrollmentStatus::Error,
            messages,
            assigned_id: None,
            recovered: false,
            template: None,
        }
    }

    /// Attach the captured template
    pub fn with_template(mut self, template: Option<Template>) -> Self {
        self.template = template;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == EnrollmentStatus::Success
    }
}

impl fmt::Display for EnrollmentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Enrollment[{:?}", self.status)?;
        if let Some(id) = self.assigned_id {
            write!(f, ", id: {}", id)?;
        }
        if self.recovered {
            write!(f, ", recovered")?;
        }
        write!(f, "]")
    }
}
