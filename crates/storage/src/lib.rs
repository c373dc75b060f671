//! Where title bytes come from and where extracted files go.
//!
//! A title is read through a [`ByteSource`], addressed by [`Resource`].
//! Extracted files are written through an [`OutputDir`].

pub mod backend;
pub mod error;
mod models;
mod output;
mod path;

pub use crate::backend::ByteSource;
pub use crate::models::Resource;
pub use crate::output::OutputDir;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type SourceHandle = Arc<dyn ByteSource>;
