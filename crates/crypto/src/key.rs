//! 16-byte AES-128 key material.

use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Length of every key used by the title format (AES-128).
pub const KEY_SIZE: usize = 16;

/// An AES-128 key.
///
/// Used for both the console-wide shared keys and per-title keys. The
/// [`Debug`] implementation never prints key bytes, so keys can sit inside
/// structs that get logged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Lowercase hexadecimal form, for explicit display only.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("Key(<redacted>)")
    }
}

impl From<[u8; KEY_SIZE]> for Key {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_SIZE] = <[u8; KEY_SIZE]>::try_from(bytes)
            .or_raise(|| ErrorKind::InvalidKey(format!("expected {KEY_SIZE} bytes, got {}", bytes.len())))?;
        Ok(Self(array))
    }
}

impl FromStr for Key {
    type Err = Error;

    /// Parses 32 hexadecimal characters. Surrounding whitespace and an
    /// optional `0x` prefix are tolerated since keys are usually pasted.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(trimmed).or_raise(|| ErrorKind::InvalidKey("not valid hexadecimal".to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}
