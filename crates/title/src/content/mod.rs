//! Content decryption and verification.
//!
//! A content is verified in one of two ways, chosen by its record's type
//! flags:
//!
//! - **Flat**: the whole plaintext is decrypted as one CBC stream seeded
//!   with the content index, and its SHA-1 is compared with the manifest.
//!   Every read streams the full content, even when only a slice is kept.
//! - **Hash tree**: the ciphertext is split into 64 KiB blocks that each
//!   carry their own hash header. Only the blocks overlapping a read are
//!   fetched, decrypted and checked up to the verified [`HashTree`] root.
//!
//! Callers ask [`ContentDecryptor::ciphertext_window`] which ciphertext bytes
//! a read needs, fetch exactly those, and hand a reader over them to
//! [`ContentDecryptor::decrypt_range`].

mod flat;
mod hashed;

pub use self::hashed::HashTree;

use crate::error::{ErrorKind, Result};
use crate::keys::TitleKey;
use crate::models::{ContentRecord, IntegrityMode};
use exn::ResultExt;
use std::io::{ErrorKind as IoErrorKind, Read};
use std::ops::Range;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct ContentDecryptor {
    record: ContentRecord,
    key: TitleKey,
}

impl ContentDecryptor {
    pub fn new(record: ContentRecord, key: TitleKey) -> Self {
        Self { record, key }
    }

    pub fn record(&self) -> &ContentRecord {
        &self.record
    }

    pub fn mode(&self) -> IntegrityMode {
        self.record.integrity_mode()
    }

    /// Number of plaintext bytes a read may address.
    pub fn plaintext_len(&self) -> u64 {
        match self.mode() {
            IntegrityMode::Flat => self.record.size,
            IntegrityMode::HashTree => hashed::data_len(self.record.size),
        }
    }

    /// The ciphertext byte range [`Self::decrypt_range`] expects its reader
    /// to start at and cover, for a read of `range`.
    pub fn ciphertext_window(&self, range: &Range<u64>) -> Range<u64> {
        match self.mode() {
            IntegrityMode::Flat => flat::window(self.record.size),
            IntegrityMode::HashTree => hashed::window(range),
        }
    }

    /// Decrypt and verify the plaintext bytes in `range`.
    ///
    /// `ciphertext` must yield the bytes of [`Self::ciphertext_window`] for
    /// the same range. Hash-tree contents also need the content's verified
    /// [`HashTree`]; without one nothing can be checked and the read fails.
    ///
    /// On an integrity failure no plaintext is returned at all.
    #[instrument(level = "debug", skip(self, ciphertext, tree), fields(content_id = self.record.id))]
    pub fn decrypt_range<R: Read>(
        &self,
        ciphertext: R,
        range: Range<u64>,
        tree: Option<&HashTree>,
    ) -> Result<Vec<u8>> {
        let len = self.plaintext_len();
        if range.start > range.end || range.end > len {
            exn::bail!(ErrorKind::OutOfBounds { content_id: self.record.id, start: range.start, end: range.end, len });
        }
        match self.mode() {
            IntegrityMode::Flat => flat::decrypt_range(&self.record, &self.key, ciphertext, range),
            IntegrityMode::HashTree => {
                let Some(tree) = tree else {
                    exn::bail!(ErrorKind::Integrity {
                        content_id: self.record.id,
                        location: crate::error::Location::HashTreeRoot,
                    });
                };
                hashed::decrypt_range(&self.record, &self.key, tree, ciphertext, range)
            },
        }
    }

    /// Decrypt and verify the whole plaintext.
    pub fn decrypt_all<R: Read>(&self, ciphertext: R, tree: Option<&HashTree>) -> Result<Vec<u8>> {
        self.decrypt_range(ciphertext, 0..self.plaintext_len(), tree)
    }
}

/// Fill `buf` from `reader`. Running out of input is an integrity failure
/// (the content is shorter than its record says); any other I/O error is
/// attached under [`ErrorKind::Read`].
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8], content_id: u32, offset: u64) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => exn::bail!(ErrorKind::Integrity {
                content_id,
                location: crate::error::Location::Truncated(offset + filled as u64),
            }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => {},
            Err(e) => return Err(e).or_raise(|| ErrorKind::Read(content_id)),
        }
    }
    Ok(())
}

/// Copy the part of `plain` (which starts at content offset `start`) that
/// falls inside `range` onto `out`.
fn keep_overlap(out: &mut Vec<u8>, plain: &[u8], start: u64, range: &Range<u64>) {
    let end = start + plain.len() as u64;
    let lo = range.start.max(start);
    let hi = range.end.min(end);
    if lo < hi {
        out.extend_from_slice(&plain[(lo - start) as usize..(hi - start) as usize]);
    }
}
