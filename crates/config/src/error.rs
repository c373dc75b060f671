//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A configuration layer could not be read or merged.
    #[display("could not load configuration: {_0}")]
    Load(#[error(not(source))] String),
    /// A key setting is not a valid 16-byte key.
    #[display("invalid key in `{field}`")]
    InvalidKey { field: &'static str },
    /// A key file exists but could not be read.
    #[display("could not read key file {}", _0.display())]
    KeyFile(#[error(not(source))] PathBuf),
    /// A setting has a value outside its allowed range.
    #[display("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ErrorKind {
    /// Configuration never fixes itself on retry.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
