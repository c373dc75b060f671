//! AES-128-CBC chaining across chunk boundaries.
//!
//! Contents are decrypted in chunks to keep memory bounded, but the chunks
//! are not a cryptographic boundary: the IV of every chunk is the last
//! ciphertext block of the chunk before it. [`CbcDecryptor`] carries that
//! state between calls.

use crate::error::{ErrorKind, Result};
use crate::key::Key;
use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// A 16-byte initialization vector.
pub type Iv = [u8; BLOCK_SIZE];

type Aes128CbcDec = cbc::Decryptor<Aes128>;
#[cfg(feature = "mock")]
type Aes128CbcEnc = cbc::Encryptor<Aes128>;

/// The all-zero IV.
pub const ZERO_IV: Iv = [0; BLOCK_SIZE];

/// IV for the first chunk of a content: its big-endian index in bytes 0..2.
#[must_use]
pub fn iv_from_index(index: u16) -> Iv {
    let mut iv = ZERO_IV;
    iv[..2].copy_from_slice(&index.to_be_bytes());
    iv
}

/// IV used to unwrap a title key: the big-endian title id in bytes 0..8.
#[must_use]
pub fn iv_from_title_id(title_id: u64) -> Iv {
    let mut iv = ZERO_IV;
    iv[..8].copy_from_slice(&title_id.to_be_bytes());
    iv
}

/// Round `len` up to the next multiple of the AES block size.
#[inline]
#[must_use]
pub fn align_to_block(len: u64) -> u64 {
    len.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

/// Streaming AES-128-CBC decryptor.
///
/// # Examples
///
/// ```
/// use nusdec_crypto::{CbcDecryptor, Key, ZERO_IV};
///
/// let key = Key::new([7; 16]);
/// let mut data = vec![0u8; 64];
/// let mut decryptor = CbcDecryptor::new(key, ZERO_IV);
/// // Two chunks decrypt exactly like one.
/// let (head, tail) = data.split_at_mut(32);
/// decryptor.decrypt_chunk(head).unwrap();
/// decryptor.decrypt_chunk(tail).unwrap();
/// ```
#[derive(Clone)]
pub struct CbcDecryptor {
    key: Key,
    iv: Iv,
}

impl CbcDecryptor {
    pub fn new(key: Key, iv: Iv) -> Self {
        Self { key, iv }
    }

    /// The IV the next chunk will be decrypted with.
    pub fn iv(&self) -> &Iv {
        &self.iv
    }

    /// Decrypt `chunk` in place and carry its last ciphertext block forward.
    pub fn decrypt_chunk(&mut self, chunk: &mut [u8]) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        if chunk.len() % BLOCK_SIZE != 0 {
            exn::bail!(ErrorKind::Misaligned(chunk.len()));
        }
        let mut next_iv = ZERO_IV;
        next_iv.copy_from_slice(&chunk[chunk.len() - BLOCK_SIZE..]);
        decrypt_in_place(&self.key, &self.iv, chunk)?;
        self.iv = next_iv;
        Ok(())
    }
}

/// One-shot AES-128-CBC decryption of a block-aligned buffer.
pub fn decrypt_in_place(key: &Key, iv: &Iv, data: &mut [u8]) -> Result<()> {
    let len = data.len();
    if len % BLOCK_SIZE != 0 {
        exn::bail!(ErrorKind::Misaligned(len));
    }
    Aes128CbcDec::new(key.as_bytes().into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| ErrorKind::Misaligned(len))?;
    Ok(())
}

/// One-shot AES-128-CBC encryption, only used to build test fixtures.
#[cfg(feature = "mock")]
pub fn encrypt_in_place(key: &Key, iv: &Iv, data: &mut [u8]) -> Result<()> {
    use cbc::cipher::BlockEncryptMut;

    let len = data.len();
    if len % BLOCK_SIZE != 0 {
        exn::bail!(ErrorKind::Misaligned(len));
    }
    Aes128CbcEnc::new(key.as_bytes().into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|_| ErrorKind::Misaligned(len))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // AES-128-CBC test vector from NIST SP 800-38A, F.2.2.
    const NIST_KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f, 0x3c,
    ];
    const NIST_IV: Iv = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    ];
    const NIST_PLAIN: [u8; 32] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17, 0x2a, 0xae, 0x2d,
        0x8a, 0x57, 0x1e, 0x03, 0xac, 0x9c, 0x9e, 0xb7, 0x6f, 0xac, 0x45, 0xaf, 0x8e, 0x51,
    ];
    const NIST_CIPHER: [u8; 32] = [
        0x76, 0x49, 0xab, 0xac, 0x81, 0x19, 0xb2, 0x46, 0xce, 0xe9, 0x8e, 0x9b, 0x12, 0xe9, 0x19, 0x7d, 0x50, 0x86,
        0xcb, 0x9b, 0x50, 0x72, 0x19, 0xee, 0x95, 0xdb, 0x11, 0x3a, 0x91, 0x76, 0x78, 0xb2,
    ];

    #[test]
    fn test_nist_vector() {
        let mut data = NIST_CIPHER;
        decrypt_in_place(&Key::new(NIST_KEY), &NIST_IV, &mut data).unwrap();
        assert_eq!(data, NIST_PLAIN);
    }

    #[rstest]
    #[case(16)]
    #[case(32)]
    fn test_chunked_matches_one_shot(#[case] split: usize) {
        let mut chunked = NIST_CIPHER;
        let mut decryptor = CbcDecryptor::new(Key::new(NIST_KEY), NIST_IV);
        let (head, tail) = chunked.split_at_mut(split);
        decryptor.decrypt_chunk(head).unwrap();
        decryptor.decrypt_chunk(tail).unwrap();
        assert_eq!(chunked, NIST_PLAIN);
    }

    #[test]
    fn test_chain_carries_last_ciphertext_block() {
        let mut data = NIST_CIPHER;
        let mut decryptor = CbcDecryptor::new(Key::new(NIST_KEY), NIST_IV);
        decryptor.decrypt_chunk(&mut data).unwrap();
        assert_eq!(decryptor.iv(), &NIST_CIPHER[16..32]);
    }

    #[test]
    fn test_misaligned_chunk() {
        let mut data = [0u8; 17];
        let err = CbcDecryptor::new(Key::new(NIST_KEY), NIST_IV).decrypt_chunk(&mut data).unwrap_err();
        assert_eq!(*err, ErrorKind::Misaligned(17));
    }

    #[test]
    fn test_iv_derivation() {
        assert_eq!(iv_from_index(0x0102), [1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(iv_from_title_id(0x0005000E_1010ED00)[..8], [0x00, 0x05, 0x00, 0x0E, 0x10, 0x10, 0xED, 0x00]);
        assert_eq!(iv_from_title_id(0x0005000E_1010ED00)[8..], [0; 8]);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 16)]
    #[case(16, 16)]
    #[case(100, 112)]
    fn test_align_to_block(#[case] len: u64, #[case] expected: u64) {
        assert_eq!(align_to_block(len), expected);
    }
}
