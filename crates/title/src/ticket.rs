use crate::consts::*;
use crate::error::{ErrorKind, Result, Structure};
use crate::keys::{KeyIndex, SharedKeys, TitleKey};
use crate::models::Ticket;
use crate::reader::{ByteReader, fixed_string};
use crate::signature;
use exn::{OptionExt, ResultExt};
use nusdec_crypto::{Key, decrypt_in_place, iv_from_title_id};
use tracing::instrument;

impl Ticket {
    #[instrument(skip(data), fields(len = data.len()))]
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = signature::body_offset(data, Structure::Ticket)?;
        if data.len() < header + TIK_MIN_LEN {
            exn::bail!(ErrorKind::ticket(format!(
                "{:#x} bytes is too short, need at least {:#x}",
                data.len(),
                header + TIK_MIN_LEN
            )));
        }
        let mut reader = ByteReader::at(data, header + TIK_ISSUER, Structure::Ticket)?;
        let issuer = fixed_string(reader.bytes(0x40)?);
        reader.seek(header + TIK_WRAPPED_KEY)?;
        let wrapped_key = reader.array()?;
        reader.seek(header + TIK_TICKET_ID)?;
        let ticket_id = reader.be_u64()?;
        reader.seek(header + TIK_CONSOLE_ID)?;
        let console_id = reader.be_u32()?;
        reader.seek(header + TIK_TITLE_ID)?;
        let title_id = reader.be_u64()?;
        reader.seek(header + TIK_TITLE_VERSION)?;
        let title_version = reader.be_u16()?;
        reader.seek(header + TIK_KEY_INDEX)?;
        let key_index = reader.u8()?;

        Ok(Self { issuer, wrapped_key, ticket_id, console_id, title_id, title_version, key_index })
    }

    /// Decrypt the wrapped title key with the shared key the ticket names.
    ///
    /// The IV is the big-endian title id followed by eight zero bytes.
    pub fn unwrap_title_key(&self, keys: &SharedKeys) -> Result<TitleKey> {
        let index = KeyIndex::try_from(self.key_index)?;
        let shared = keys
            .get(index)
            .ok_or_raise(|| ErrorKind::KeyDerivation(format!("no {index} key is configured (index {})", index.as_u8())))?;
        let mut key = self.wrapped_key;
        decrypt_in_place(shared, &iv_from_title_id(self.title_id), &mut key)
            .or_raise(|| ErrorKind::KeyDerivation("failed to decrypt the wrapped key".to_string()))?;
        tracing::debug!(title_id = %format!("{:016X}", self.title_id), key_index = %index, "unwrapped title key");
        Ok(TitleKey::new(Key::new(key)))
    }
}

/// Parse `ticket` and unwrap its title key in one step. A malformed ticket
/// is reported as a key derivation failure, with the parse error attached.
pub fn unwrap_title_key(ticket: &[u8], keys: &SharedKeys) -> Result<TitleKey> {
    Ticket::parse(ticket)
        .or_raise(|| ErrorKind::KeyDerivation("ticket is malformed".to_string()))?
        .unwrap_title_key(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use rstest::rstest;

    const TITLE_ID: u64 = 0x0005_000E_1010_ED00;

    fn common_key() -> Key {
        Key::new(*b"common-key-16byt")
    }

    fn title_key() -> Key {
        Key::new([0x5A; 16])
    }

    #[test]
    fn test_parse() {
        let bytes = fixtures::ticket(TITLE_ID, &title_key(), &common_key(), 0);
        let ticket = Ticket::parse(&bytes).unwrap();
        assert_eq!(ticket.title_id, TITLE_ID);
        assert_eq!(ticket.key_index, 0);
        assert_eq!(ticket.issuer, fixtures::TICKET_ISSUER);
        assert_ne!(ticket.wrapped_key, *title_key().as_bytes());
    }

    #[test]
    fn test_unwrap_round_trip() {
        let bytes = fixtures::ticket(TITLE_ID, &title_key(), &common_key(), 0);
        let keys = SharedKeys::new().with_common_key_override(common_key());
        assert_eq!(unwrap_title_key(&bytes, &keys).unwrap(), TitleKey::new(title_key()));
    }

    #[test]
    fn test_unwrap_uses_indexed_key() {
        let korean = Key::new([0x4B; 16]);
        let bytes = fixtures::ticket(TITLE_ID, &title_key(), &korean, 1);
        let keys = SharedKeys::new().with_common_key_override(common_key()).with_key(KeyIndex::Korean, korean);
        assert_eq!(unwrap_title_key(&bytes, &keys).unwrap(), TitleKey::new(title_key()));
    }

    #[test]
    fn test_wrong_shared_key_yields_wrong_title_key() {
        // Unwrapping cannot tell a wrong key from a right one. The mismatch
        // only surfaces later as an integrity failure.
        let bytes = fixtures::ticket(TITLE_ID, &title_key(), &common_key(), 0);
        let keys = SharedKeys::new().with_common_key_override(Key::new([0; 16]));
        assert_ne!(unwrap_title_key(&bytes, &keys).unwrap(), TitleKey::new(title_key()));
    }

    #[rstest]
    #[case(0, SharedKeys::new())]
    #[case(2, SharedKeys::new().with_common_key_override(Key::new([1; 16])))]
    #[case(7, SharedKeys::new().with_common_key_override(Key::new([1; 16])))]
    fn test_missing_key(#[case] key_index: u8, #[case] keys: SharedKeys) {
        let bytes = fixtures::ticket(TITLE_ID, &title_key(), &common_key(), key_index);
        let err = unwrap_title_key(&bytes, &keys).unwrap_err();
        assert!(matches!(&*err, ErrorKind::KeyDerivation(_)));
    }

    #[rstest]
    #[case(0)]
    #[case(0x100)]
    #[case(0x140 + TIK_KEY_INDEX)]
    fn test_truncated_ticket(#[case] len: usize) {
        let bytes = fixtures::ticket(TITLE_ID, &title_key(), &common_key(), 0);
        let keys = SharedKeys::new().with_common_key_override(common_key());
        let err = unwrap_title_key(&bytes[..len], &keys).unwrap_err();
        assert!(matches!(&*err, ErrorKind::KeyDerivation(_)));
        assert!(matches!(&*Ticket::parse(&bytes[..len]).unwrap_err(), ErrorKind::Format { .. }));
    }
}
