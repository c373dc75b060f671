//! Title Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A title decoding error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for title decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which on-disk structure failed to parse.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    #[display("manifest")]
    Manifest,
    #[display("ticket")]
    Ticket,
    #[display("directory table")]
    DirectoryTable,
}

/// Where inside a content an integrity check failed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// The digest over the whole plaintext did not match the manifest.
    #[display("whole content")]
    WholeContent,
    /// A hash-tree block failed verification. `offset` is the plaintext
    /// offset of the block's first data byte.
    #[display("block {index} (data offset {offset:#x})")]
    Block { index: u64, offset: u64 },
    /// The content's hash-tree file did not match the manifest digest.
    #[display("hash tree root")]
    HashTreeRoot,
    /// The ciphertext ended before the size declared in the manifest.
    #[display("truncated at offset {_0:#x}")]
    Truncated(u64),
}

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A manifest, ticket or directory table is structurally invalid.
    #[display("malformed {structure}: {reason}")]
    Format { structure: Structure, reason: String },
    /// No usable title key could be produced.
    #[display("cannot derive title key: {_0}")]
    KeyDerivation(#[error(not(source))] String),
    /// Decrypted data did not match its recorded hash.
    #[display("integrity check failed for content {content_id:08X} at {location}")]
    Integrity { content_id: u32, location: Location },
    /// A read went past the end of a content's plaintext.
    #[display("range {start:#x}..{end:#x} exceeds content {content_id:08X} of {len:#x} bytes")]
    OutOfBounds { content_id: u32, start: u64, end: u64, len: u64 },
    /// The ciphertext reader failed; the underlying error is attached as a child.
    #[display("failed to read ciphertext of content {_0:08X}")]
    Read(#[error(not(source))] u32),
}

impl ErrorKind {
    pub(crate) fn manifest(reason: impl Into<String>) -> Self {
        Self::Format { structure: Structure::Manifest, reason: reason.into() }
    }

    pub(crate) fn ticket(reason: impl Into<String>) -> Self {
        Self::Format { structure: Structure::Ticket, reason: reason.into() }
    }

    pub(crate) fn directory(reason: impl Into<String>) -> Self {
        Self::Format { structure: Structure::DirectoryTable, reason: reason.into() }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Only the reader can fail transiently. Bytes that failed to parse or
        // verify will fail the same way next time.
        matches!(self, Self::Read(_))
    }
}
