//! Extraction Error Types
//!
//! Errors from the title and storage crates are attached as children of
//! the kinds below, so callers can act on the category without unpacking
//! the whole tree.

use derive_more::{Display, Error};
use exn::ResultExt;
use nusdec_storage::Resource;
use nusdec_storage::error::Error as StorageError;
use nusdec_title::error::{Error as TitleError, ErrorKind as TitleErrorKind, Location};
use std::path::PathBuf;

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// [`Format`](Self::Format) and [`KeyDerivation`](Self::KeyDerivation) are
/// fatal to a session. The others are reported per file.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The manifest or directory table is malformed, or a file points
    /// outside its content.
    #[display("malformed title data")]
    Format,
    /// The ticket is unusable or the shared key it needs is missing.
    #[display("cannot derive title key")]
    KeyDerivation,
    /// Decrypted bytes did not match their recorded hash.
    #[display("integrity check failed for content {content_id:08X} at {location}")]
    Integrity { content_id: u32, location: Location },
    /// The byte source could not provide a resource.
    #[display("failed to retrieve {resource}")]
    Retrieval { resource: Resource, retryable: bool },
    /// The extracted file could not be written.
    #[display("failed to write {}", _0.display())]
    Destination(#[error(not(source))] PathBuf),
    /// A pattern is not a valid regular expression.
    #[display("invalid file pattern: {_0}")]
    Pattern(#[error(not(source))] String),
    /// Decryption ran on a blocking task that panicked.
    #[display("decryption task failed")]
    Task,
    #[display("extraction cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Retrieval { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

/// Re-raise title decoding errors under the matching extraction kind.
pub(crate) trait TitleResultExt<T> {
    fn or_classify(self) -> Result<T>;
}

impl<T> TitleResultExt<T> for std::result::Result<T, TitleError> {
    fn or_classify(self) -> Result<T> {
        let err = match self {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let kind = match &*err {
            TitleErrorKind::Format { .. } | TitleErrorKind::OutOfBounds { .. } => ErrorKind::Format,
            TitleErrorKind::KeyDerivation(_) => ErrorKind::KeyDerivation,
            TitleErrorKind::Integrity { content_id, location } => {
                ErrorKind::Integrity { content_id: *content_id, location: *location }
            },
            TitleErrorKind::Read(id) => ErrorKind::Retrieval { resource: Resource::Content(*id), retryable: true },
        };
        Err(err).or_raise(|| kind)
    }
}

/// Re-raise storage errors as a retrieval failure of `resource`.
pub(crate) trait StorageResultExt<T> {
    fn or_retrieve(self, resource: Resource) -> Result<T>;
}

impl<T> StorageResultExt<T> for std::result::Result<T, StorageError> {
    fn or_retrieve(self, resource: Resource) -> Result<T> {
        let retryable = self.as_ref().err().is_some_and(|err| err.is_retryable());
        self.or_raise(|| ErrorKind::Retrieval { resource, retryable })
    }
}
