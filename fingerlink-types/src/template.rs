//! Fingerprint template
//!
//! Templates are produced on the sensor itself. On the wire and in storage
//! they travel as 1024 hexadecimal characters encoding 512 bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed-length biometric feature vector (512 bytes)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template {
    bytes: Box<[u8; Template::SIZE]>,
}

impl Template {
    /// Template size in bytes
    pub const SIZE: usize = 512;

    /// Length of the hexadecimal wire form
    pub const HEX_LEN: usize = Self::SIZE * 2;

    /// Build a template from raw bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] unless `bytes` is exactly 512 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; Self::SIZE] = bytes.try_into().map_err(|_| {
            Error::Validation(format!(
                "template must be {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            ))
        })?;

        Ok(Self {
            bytes: Box::new(array),
        })
    }

    /// Decode a template from its 1024-character hexadecimal form
    ///
    /// Surrounding whitespace is ignored; anything else that is not exactly
    /// 1024 hex digits is rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerlink_types::Template;
    ///
    /// let hex = "ab".repeat(512);
    /// let template = Template::from_hex(&hex).unwrap();
    /// assert_eq!(template.as_bytes()[0], 0xAB);
    ///
    /// assert!(Template::from_hex("abcd").is_err());
    /// ```
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let trimmed = hex_str.trim();

        if trimmed.len() != Self::HEX_LEN {
            return Err(Error::Validation(format!(
                "template hex must be {} characters, got {}",
                Self::HEX_LEN,
                trimmed.len()
            )));
        }

        let mut array = [0u8; Self::SIZE];
        hex::decode_to_slice(trimmed, &mut array)
            .map_err(|e| Error::Parse(format!("invalid template hex: {}", e)))?;

        Ok(Self {
            bytes: Box::new(array),
        })
    }

    /// Raw template bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    /// Uppercase hexadecimal wire form
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes[..])
    }
}

impl TryFrom<String> for Template {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> String {
        template.to_hex()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({:02X?}..)", &self.bytes[..8])
    }
}
