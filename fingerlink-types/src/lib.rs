//! Type definitions for fingerlink

pub mod enrollment;
pub mod error;
pub mod matching;
pub mod record;
pub mod template;

pub use enrollment::{EnrollmentOutcome, EnrollmentStatus};
pub use error::{Error, Result};
pub use matching::MatchResult;
pub use record::{CardScan, DeviceSnapshot, FingerprintRecord, StoredTemplate};
pub use template::Template;
