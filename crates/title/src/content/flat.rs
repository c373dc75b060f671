use super::{keep_overlap, read_full};
use crate::consts::FLAT_CHUNK_SIZE;
use crate::error::{ErrorKind, Location, Result};
use crate::keys::TitleKey;
use crate::models::ContentRecord;
use exn::ResultExt;
use nusdec_crypto::{CbcDecryptor, Sha1Hasher, align_to_block, iv_from_index};
use std::io::Read;
use std::ops::Range;

/// Flat contents are one CBC stream, so every read covers all of it.
pub(super) fn window(size: u64) -> Range<u64> {
    0..align_to_block(size)
}

pub(super) fn decrypt_range<R: Read>(
    record: &ContentRecord,
    key: &TitleKey,
    mut ciphertext: R,
    range: Range<u64>,
) -> Result<Vec<u8>> {
    let size = record.size;
    let total = align_to_block(size);
    let encrypted = record.content_type.is_encrypted();
    let mut decryptor = CbcDecryptor::new(*key.key(), iv_from_index(record.index));
    let mut hasher = Sha1Hasher::new();
    let mut out = Vec::with_capacity((range.end - range.start) as usize);
    let mut chunk = vec![0u8; FLAT_CHUNK_SIZE];

    let mut pos = 0u64;
    while pos < total {
        let len = (total - pos).min(FLAT_CHUNK_SIZE as u64) as usize;
        let buf = &mut chunk[..len];
        read_full(&mut ciphertext, buf, record.id, pos)?;
        if encrypted {
            decryptor
                .decrypt_chunk(buf)
                .or_raise(|| ErrorKind::Integrity { content_id: record.id, location: Location::Truncated(pos) })?;
        }
        // The last chunk carries up to 15 bytes of cipher padding, which are
        // neither hashed nor returned.
        let plain_len = (size.min(pos + len as u64) - pos) as usize;
        let plain = &buf[..plain_len];
        hasher.update(plain);
        keep_overlap(&mut out, plain, pos, &range);
        pos += len as u64;
    }

    let digest = hasher.finish();
    if digest != record.digest {
        tracing::warn!(content_id = record.id, expected = %record.digest, actual = %digest, "content digest mismatch");
        exn::bail!(ErrorKind::Integrity { content_id: record.id, location: Location::WholeContent });
    }
    Ok(out)
}
