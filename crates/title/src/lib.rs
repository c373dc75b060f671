//! Decoding for NUS titles.
//!
//! A title is a signed manifest listing its contents, a ticket carrying the
//! wrapped title key, and the encrypted contents themselves. Content 0 holds
//! a directory table that maps a virtual filesystem onto byte ranges of the
//! other contents.
//!
//! This crate covers the byte-level formats only:
//!
//! - [`TitleManifest::parse`] for the content table
//! - [`Ticket::parse`] and [`unwrap_title_key`] for the title key
//! - [`ContentDecryptor`] for verified range reads from a content
//! - [`VirtualTree::parse`] for the directory table
//!
//! Fetching bytes, concurrency and writing files out live in other crates.

mod consts;
pub mod content;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod fixtures;
mod fst;
pub mod keys;
mod manifest;
pub mod models;
mod reader;
mod signature;
mod ticket;

pub use crate::content::{ContentDecryptor, HashTree};
pub use crate::keys::{KeyIndex, SharedKeys, TitleKey, TitleKeySource};
pub use crate::models::{ContentRecord, IntegrityMode, Ticket, TitleManifest, VirtualTree};
pub use crate::ticket::unwrap_title_key;
