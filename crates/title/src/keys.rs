//! Shared console keys and per-title keys.
//!
//! No key material ships with this crate. Callers load shared keys from
//! their own configuration and pass them in explicitly; nothing is cached
//! in globals.

use crate::error::{Error, ErrorKind, Result};
use crate::models::Ticket;
use derive_more::Display;
use nusdec_crypto::Key;

/// Which shared key a ticket was wrapped with.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyIndex {
    #[display("common")]
    Common,
    #[display("Korean")]
    Korean,
    #[display("vWii")]
    Vwii,
}

impl KeyIndex {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Common => 0,
            Self::Korean => 1,
            Self::Vwii => 2,
        }
    }
}

impl TryFrom<u8> for KeyIndex {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Common),
            1 => Ok(Self::Korean),
            2 => Ok(Self::Vwii),
            other => exn::bail!(ErrorKind::KeyDerivation(format!("unknown shared key index {other}"))),
        }
    }
}

/// The console-wide keys tickets are wrapped with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedKeys {
    keys: [Option<Key>; 3],
}

impl SharedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, index: KeyIndex, key: Key) -> Self {
        self.keys[usize::from(index.as_u8())] = Some(key);
        self
    }

    /// Replace the key at index 0, the one almost every retail ticket uses.
    pub fn with_common_key_override(self, key: Key) -> Self {
        self.with_key(KeyIndex::Common, key)
    }

    pub fn get(&self, index: KeyIndex) -> Option<&Key> {
        self.keys[usize::from(index.as_u8())].as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.iter().all(Option::is_none)
    }
}

/// A decrypted per-title key. Debug output is redacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleKey(Key);

impl TitleKey {
    pub fn new(key: Key) -> Self {
        Self(key)
    }

    pub fn key(&self) -> &Key {
        &self.0
    }
}

impl From<Key> for TitleKey {
    fn from(key: Key) -> Self {
        Self(key)
    }
}

/// Where the title key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleKeySource {
    /// Unwrap the key from a ticket using the configured shared keys.
    Ticket(Ticket),
    /// A key supplied directly by the caller; no ticket or shared key needed.
    Explicit(TitleKey),
}

impl TitleKeySource {
    pub fn resolve(&self, keys: &SharedKeys) -> Result<TitleKey> {
        match self {
            Self::Ticket(ticket) => ticket.unwrap_title_key(keys),
            Self::Explicit(key) => Ok(*key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, KeyIndex::Common)]
    #[case(1, KeyIndex::Korean)]
    #[case(2, KeyIndex::Vwii)]
    fn test_key_index(#[case] raw: u8, #[case] expected: KeyIndex) {
        assert_eq!(KeyIndex::try_from(raw).unwrap(), expected);
        assert_eq!(expected.as_u8(), raw);
    }

    #[test]
    fn test_key_index_out_of_range() {
        let err = KeyIndex::try_from(3).unwrap_err();
        assert!(matches!(&*err, ErrorKind::KeyDerivation(_)));
    }

    #[test]
    fn test_shared_keys() {
        let keys = SharedKeys::new();
        assert!(keys.is_empty());
        let keys = keys.with_key(KeyIndex::Korean, Key::new([1; 16]));
        assert!(keys.get(KeyIndex::Common).is_none());
        assert_eq!(keys.get(KeyIndex::Korean), Some(&Key::new([1; 16])));
        let keys = keys.with_common_key_override(Key::new([2; 16]));
        assert_eq!(keys.get(KeyIndex::Common), Some(&Key::new([2; 16])));
    }

    #[test]
    fn test_explicit_source_ignores_shared_keys() {
        let key = TitleKey::new(Key::new([9; 16]));
        assert_eq!(TitleKeySource::Explicit(key).resolve(&SharedKeys::new()).unwrap(), key);
    }
}
