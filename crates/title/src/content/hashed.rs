use super::{keep_overlap, read_full};
use crate::consts::*;
use crate::error::{ErrorKind, Location, Result};
use crate::keys::TitleKey;
use crate::models::ContentRecord;
use exn::ResultExt;
use nusdec_crypto::{BLOCK_SIZE, Iv, SHA1_SIZE, Sha1Digest, decrypt_in_place, iv_from_index};
use std::io::Read;
use std::ops::Range;

const BLOCK: u64 = HASH_BLOCK_SIZE as u64;
const DATA: u64 = HASH_DATA_SIZE as u64;
const FANOUT: u64 = HASHES_PER_TABLE as u64;

/// Plaintext bytes addressable in a hashed content of `size` ciphertext
/// bytes. A trailing partial block carries no data.
pub(super) fn data_len(size: u64) -> u64 {
    size / BLOCK * DATA
}

/// Whole blocks covering the plaintext `range`, as a ciphertext range.
pub(super) fn window(range: &Range<u64>) -> Range<u64> {
    if range.start >= range.end {
        return 0..0;
    }
    let first = range.start / DATA;
    let last = (range.end - 1) / DATA;
    first * BLOCK..(last + 1) * BLOCK
}

/// The top level of a content's hash tree: one SHA-1 per 4096 blocks.
///
/// Only constructed through [`HashTree::verify`], so holding one means the
/// root has already been checked against the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTree {
    content_id: u32,
    entries: Vec<Sha1Digest>,
}

impl HashTree {
    /// Check `bytes` (the content's hash-tree file) against the record's
    /// digest and that it has an entry for every group of blocks.
    pub fn verify(record: &ContentRecord, bytes: &[u8]) -> Result<Self> {
        let root_mismatch = || ErrorKind::Integrity { content_id: record.id, location: Location::HashTreeRoot };
        let digest = Sha1Digest::of(bytes);
        if digest != record.digest {
            tracing::warn!(content_id = record.id, expected = %record.digest, actual = %digest, "hash tree root mismatch");
            exn::bail!(root_mismatch());
        }
        let needed = (record.size / BLOCK).div_ceil(FANOUT * FANOUT * FANOUT) as usize;
        let entries: Vec<Sha1Digest> = bytes.chunks_exact(SHA1_SIZE).filter_map(Sha1Digest::from_prefix).collect();
        if bytes.len() % SHA1_SIZE != 0 || entries.len() < needed {
            exn::bail!(root_mismatch());
        }
        Ok(Self { content_id: record.id, entries })
    }

    pub fn content_id(&self) -> u32 {
        self.content_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(super) fn decrypt_range<R: Read>(
    record: &ContentRecord,
    key: &TitleKey,
    tree: &HashTree,
    mut ciphertext: R,
    range: Range<u64>,
) -> Result<Vec<u8>> {
    if tree.content_id != record.id {
        tracing::warn!(content_id = record.id, tree = tree.content_id, "hash tree belongs to another content");
        exn::bail!(ErrorKind::Integrity { content_id: record.id, location: Location::HashTreeRoot });
    }
    let mut out = Vec::with_capacity((range.end - range.start) as usize);
    if range.is_empty() {
        return Ok(out);
    }
    let first = range.start / DATA;
    let last = (range.end - 1) / DATA;
    let mut block = vec![0u8; HASH_BLOCK_SIZE];
    for index in first..=last {
        read_full(&mut ciphertext, &mut block, record.id, index * BLOCK)?;
        let data = decrypt_block(record, key, tree, index, &mut block)?;
        keep_overlap(&mut out, data, index * DATA, &range);
    }
    tracing::trace!(content_id = record.id, blocks = last - first + 1, "verified hashed blocks");
    Ok(out)
}

/// Decrypt one block in place and walk its hashes up to the tree root.
/// Returns the block's plaintext data.
fn decrypt_block<'a>(
    record: &ContentRecord,
    key: &TitleKey,
    tree: &HashTree,
    index: u64,
    block: &'a mut [u8],
) -> Result<&'a [u8]> {
    let failed = || ErrorKind::Integrity {
        content_id: record.id,
        location: Location::Block { index, offset: index * DATA },
    };
    let encrypted = record.content_type.is_encrypted();
    let (header, data) = block.split_at_mut(HASH_HEADER_SIZE);
    if encrypted {
        decrypt_in_place(key.key(), &iv_from_index(record.index), header).or_raise(failed)?;
    }
    let h0 = &header[..HASH_TABLE_SIZE];
    let h1 = &header[HASH_TABLE_SIZE..2 * HASH_TABLE_SIZE];
    let h2 = &header[2 * HASH_TABLE_SIZE..3 * HASH_TABLE_SIZE];

    // The first block of every group of 16 mixes the content index into both
    // its IV and its stored hash.
    let slot = (index % FANOUT) as usize;
    let salt = if slot == 0 { record.index as u8 } else { 0 };
    let expected = table_entry(h0, slot);
    if encrypted {
        let mut iv: Iv = [0; BLOCK_SIZE];
        iv.copy_from_slice(&expected.as_bytes()[..BLOCK_SIZE]);
        iv[1] ^= salt;
        decrypt_in_place(key.key(), &iv, data).or_raise(failed)?;
    }
    let mut actual = Sha1Digest::of(data);
    actual.0[1] ^= salt;

    let verified = actual == expected
        && Sha1Digest::of(h0) == table_entry(h1, ((index / FANOUT) % FANOUT) as usize)
        && Sha1Digest::of(h1) == table_entry(h2, ((index / (FANOUT * FANOUT)) % FANOUT) as usize)
        && tree.entries.get((index / (FANOUT * FANOUT * FANOUT)) as usize) == Some(&Sha1Digest::of(h2));
    if !verified {
        tracing::warn!(content_id = record.id, block = index, "hashed block failed verification");
        exn::bail!(failed());
    }
    Ok(data)
}

fn table_entry(table: &[u8], slot: usize) -> Sha1Digest {
    let mut digest = Sha1Digest::default();
    digest.0.copy_from_slice(&table[slot * SHA1_SIZE..(slot + 1) * SHA1_SIZE]);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentDecryptor;
    use crate::fixtures;
    use nusdec_crypto::Key;
    use rstest::rstest;
    use std::io::Cursor;

    fn key() -> TitleKey {
        TitleKey::new(Key::new([0x47; 16]))
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[rstest]
    #[case(0..1, 0..BLOCK)]
    #[case(0..DATA, 0..BLOCK)]
    #[case(0..DATA + 1, 0..2 * BLOCK)]
    #[case(DATA * 3 + 7..DATA * 3 + 9, 3 * BLOCK..4 * BLOCK)]
    #[case(5..5, 0..0)]
    fn test_window(#[case] range: Range<u64>, #[case] expected: Range<u64>) {
        assert_eq!(window(&range), expected);
    }

    #[test]
    fn test_data_len() {
        assert_eq!(data_len(0), 0);
        assert_eq!(data_len(BLOCK * 3), DATA * 3);
        assert_eq!(data_len(BLOCK * 3 + 5), DATA * 3);
    }

    #[rstest]
    #[case(1)]
    #[case(HASH_DATA_SIZE)]
    #[case(HASH_DATA_SIZE * 17 + 3)]
    fn test_decrypt_all(#[case] len: usize) {
        let plaintext = pattern(len);
        let content = fixtures::hashed_content(&key(), 5, &plaintext);
        let tree = HashTree::verify(&content.record, content.hash_tree.as_deref().unwrap()).unwrap();
        let decryptor = ContentDecryptor::new(content.record, key());
        let got = decryptor.decrypt_all(Cursor::new(&content.ciphertext), Some(&tree)).unwrap();
        // The plaintext is zero-padded to whole blocks.
        assert_eq!(&got[..len], &plaintext[..]);
        assert!(got[len..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_range_fetches_only_touched_blocks() {
        let plaintext = pattern(HASH_DATA_SIZE * 20);
        let content = fixtures::hashed_content(&key(), 1, &plaintext);
        let tree = HashTree::verify(&content.record, content.hash_tree.as_deref().unwrap()).unwrap();
        let decryptor = ContentDecryptor::new(content.record, key());

        let range = DATA * 16 - 10..DATA * 17 + 10;
        let window = decryptor.ciphertext_window(&range);
        assert_eq!(window, 15 * BLOCK..18 * BLOCK);
        let slice = &content.ciphertext[window.start as usize..window.end as usize];
        let got = decryptor.decrypt_range(Cursor::new(slice), range.clone(), Some(&tree)).unwrap();
        assert_eq!(got, &plaintext[range.start as usize..range.end as usize]);
    }

    #[test]
    fn test_damage_outside_range_is_not_detected() {
        let plaintext = pattern(HASH_DATA_SIZE * 3);
        let mut content = fixtures::hashed_content(&key(), 1, &plaintext);
        let tree = HashTree::verify(&content.record, content.hash_tree.as_deref().unwrap()).unwrap();
        content.ciphertext[2 * HASH_BLOCK_SIZE + 0x500] ^= 0xFF;
        let decryptor = ContentDecryptor::new(content.record, key());
        let got = decryptor.decrypt_range(Cursor::new(&content.ciphertext), 0..DATA, Some(&tree)).unwrap();
        assert_eq!(got, &plaintext[..HASH_DATA_SIZE]);
    }

    #[rstest]
    #[case::data(0x500)]
    #[case::header(0x10)]
    #[case::last_data_byte(HASH_BLOCK_SIZE - 1)]
    fn test_damaged_block_is_located(#[case] offset_in_block: usize) {
        let plaintext = pattern(HASH_DATA_SIZE * 3);
        let mut content = fixtures::hashed_content(&key(), 1, &plaintext);
        let tree = HashTree::verify(&content.record, content.hash_tree.as_deref().unwrap()).unwrap();
        content.ciphertext[HASH_BLOCK_SIZE + offset_in_block] ^= 0xFF;
        let decryptor = ContentDecryptor::new(content.record, key());
        let err = decryptor.decrypt_all(Cursor::new(&content.ciphertext), Some(&tree)).unwrap_err();
        assert_eq!(
            *err,
            ErrorKind::Integrity {
                content_id: fixtures::content_id(1),
                location: Location::Block { index: 1, offset: DATA }
            }
        );
    }

    #[test]
    fn test_tree_root_mismatch() {
        let content = fixtures::hashed_content(&key(), 1, &pattern(10));
        let mut bytes = content.hash_tree.unwrap();
        bytes[0] ^= 1;
        let err = HashTree::verify(&content.record, &bytes).unwrap_err();
        assert_eq!(
            *err,
            ErrorKind::Integrity { content_id: fixtures::content_id(1), location: Location::HashTreeRoot }
        );
    }

    #[test]
    fn test_tree_from_other_content_is_rejected() {
        let ours = fixtures::hashed_content(&key(), 1, &pattern(10));
        let theirs = fixtures::hashed_content(&key(), 2, &pattern(20));
        let tree = HashTree::verify(&theirs.record, theirs.hash_tree.as_deref().unwrap()).unwrap();
        assert_eq!(tree.content_id(), fixtures::content_id(2));
        assert_eq!(tree.len(), 1);
        assert!(HashTree::verify(&ours.record, theirs.hash_tree.as_deref().unwrap()).is_err());
    }

    #[test]
    fn test_decrypt_with_other_contents_tree() {
        let plaintext = pattern(HASH_DATA_SIZE);
        let ours = fixtures::hashed_content(&key(), 1, &plaintext);
        let theirs = fixtures::hashed_content(&key(), 2, &plaintext);
        let tree = HashTree::verify(&theirs.record, theirs.hash_tree.as_deref().unwrap()).unwrap();
        let decryptor = ContentDecryptor::new(ours.record, key());
        let err = decryptor.decrypt_range(Cursor::new(&ours.ciphertext), 0..16, Some(&tree)).unwrap_err();
        assert_eq!(
            *err,
            ErrorKind::Integrity { content_id: fixtures::content_id(1), location: Location::HashTreeRoot }
        );
    }
}
