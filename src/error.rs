//! Command-line Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Which stage of a run failed. The cause is attached as a child.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("could not open title source")]
    Source,
    #[display("could not open title")]
    Session,
    #[display("could not prepare output directory")]
    Output,
    #[display("extraction failed")]
    Extraction,
}
