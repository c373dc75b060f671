//! SHA-1 and SHA-256 digests.

use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

/// Length of a SHA-1 digest.
pub const SHA1_SIZE: usize = 20;
/// Length of a SHA-256 digest.
pub const SHA256_SIZE: usize = 32;

/// A SHA-1 digest, displayed as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sha1Digest(pub [u8; SHA1_SIZE]);

impl Sha1Digest {
    pub fn of(data: &[u8]) -> Self {
        Self(Sha1::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; SHA1_SIZE] {
        &self.0
    }

    /// Read a digest from the first 20 bytes of `bytes`, if there are enough.
    pub fn from_prefix(bytes: &[u8]) -> Option<Self> {
        bytes.get(..SHA1_SIZE)?.try_into().ok().map(Self)
    }
}

impl Display for Sha1Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&hex::encode(self.0))
    }
}

impl Debug for Sha1Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Sha1Digest({self})")
    }
}

/// Incremental SHA-1, for hashing content as it streams past.
#[derive(Clone, Default)]
pub struct Sha1Hasher(Sha1);

impl Sha1Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finish(self) -> Sha1Digest {
        Sha1Digest(self.0.finalize().into())
    }
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; SHA256_SIZE] {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_known_value() {
        assert_eq!(Sha1Digest::of(b"abc").to_string(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = Sha1Hasher::new();
        hasher.update(b"a");
        hasher.update(b"bc");
        assert_eq!(hasher.finish(), Sha1Digest::of(b"abc"));
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(hex::encode(sha256(b"abc")), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn test_from_prefix() {
        let bytes = [9u8; 32];
        assert_eq!(Sha1Digest::from_prefix(&bytes), Some(Sha1Digest([9; 20])));
        assert_eq!(Sha1Digest::from_prefix(&bytes[..19]), None);
    }
}
