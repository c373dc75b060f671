//! Opening titles and extracting their files.
//!
//! A [`Session`] holds one title's manifest and key and lazily loads its
//! directory tree. [`extract`] (or [`extract_stream`] for progress events)
//! walks that tree, decrypts the files an [`ExtractionRequest`] selects and
//! writes them out, collecting one [`EntryReport`] per file.

pub mod error;
mod extract;
#[cfg(test)]
mod fixtures;
mod models;
mod session;

pub use crate::extract::{ExtractEvent, ExtractionRequest, OverwritePolicy, extract, extract_stream};
pub use crate::models::{EntryReport, ExtractionReport, Outcome};
pub use crate::session::Session;
