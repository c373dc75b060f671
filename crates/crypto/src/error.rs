//! Crypto Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A crypto error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for crypto operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Key material was not exactly 16 bytes, or not valid hexadecimal.
    #[display("invalid key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// Cipher input must be a whole number of AES blocks.
    #[display("input length {_0} is not a multiple of the AES block size")]
    Misaligned(#[error(not(source))] usize),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Same input, same output. Nothing here is transient.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Misaligned(17).to_string(), "input length 17 is not a multiple of the AES block size");
        assert_eq!(ErrorKind::InvalidKey("too short".to_string()).to_string(), "invalid key: too short");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(!ErrorKind::Misaligned(1).is_retryable());
    }
}
