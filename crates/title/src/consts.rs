// Signed structures (manifest, ticket) open with a 4-byte signature type
// followed by the signature and padding. Everything else is relative to the
// end of that block.
pub(crate) const SIG_RSA4096: u32 = 0x0001_0000;
pub(crate) const SIG_RSA2048: u32 = 0x0001_0001;
pub(crate) const SIG_ECDSA: u32 = 0x0001_0002;
pub(crate) const SIG_RSA4096_SHA256: u32 = 0x0001_0003;
pub(crate) const SIG_RSA2048_SHA256: u32 = 0x0001_0004;
pub(crate) const SIG_ECDSA_SHA256: u32 = 0x0001_0005;

// Manifest header, relative to the end of the signature block.
pub(crate) const TMD_ISSUER: usize = 0x00;
pub(crate) const TMD_ISSUER_LEN: usize = 0x40;
pub(crate) const TMD_VERSION: usize = 0x40;
pub(crate) const TMD_SYSTEM_VERSION: usize = 0x44;
pub(crate) const TMD_TITLE_ID: usize = 0x4C;
pub(crate) const TMD_TITLE_TYPE: usize = 0x54;
pub(crate) const TMD_GROUP_ID: usize = 0x58;
pub(crate) const TMD_ACCESS_RIGHTS: usize = 0x98;
pub(crate) const TMD_TITLE_VERSION: usize = 0x9C;
pub(crate) const TMD_CONTENT_COUNT: usize = 0x9E;
pub(crate) const TMD_BOOT_INDEX: usize = 0xA0;
// Version 1 only: SHA-256 over the content info table, then the table itself.
pub(crate) const TMD_INFO_TABLE_HASH: usize = 0xA4;
pub(crate) const TMD_INFO_TABLE: usize = 0xC4;
pub(crate) const TMD_INFO_ENTRIES: usize = 64;
pub(crate) const TMD_INFO_ENTRY_SIZE: usize = 0x24;
pub(crate) const TMD_V1_RECORDS: usize = TMD_INFO_TABLE + TMD_INFO_ENTRIES * TMD_INFO_ENTRY_SIZE;
pub(crate) const TMD_V1_RECORD_SIZE: usize = 0x30;
pub(crate) const TMD_V0_RECORDS: usize = 0xA4;
pub(crate) const TMD_V0_RECORD_SIZE: usize = 0x24;

// Ticket fields, relative to the end of the signature block.
pub(crate) const TIK_ISSUER: usize = 0x00;
pub(crate) const TIK_WRAPPED_KEY: usize = 0x7F;
pub(crate) const TIK_TICKET_ID: usize = 0x90;
pub(crate) const TIK_CONSOLE_ID: usize = 0x98;
pub(crate) const TIK_TITLE_ID: usize = 0x9C;
pub(crate) const TIK_TITLE_VERSION: usize = 0xA6;
pub(crate) const TIK_KEY_INDEX: usize = 0xB1;
pub(crate) const TIK_MIN_LEN: usize = TIK_KEY_INDEX + 1;

// Directory table.
pub(crate) const FST_MAGIC: [u8; 4] = *b"FST\0";
pub(crate) const FST_HEADER_SIZE: usize = 0x20;
pub(crate) const FST_SECONDARY_SIZE: usize = 0x20;
pub(crate) const FST_ENTRY_SIZE: usize = 0x10;
pub(crate) const FST_TYPE_DIRECTORY: u8 = 0x01;
pub(crate) const FST_TYPE_NOT_IN_PACKAGE: u8 = 0x80;
// Set on files whose offset is stored in bytes rather than in units of the
// header's offset factor.
pub(crate) const FST_FLAG_RAW_OFFSET: u16 = 0x0004;

// Content encryption.
pub(crate) const FLAT_CHUNK_SIZE: usize = 0x8000;
pub(crate) const HASH_BLOCK_SIZE: usize = 0x10000;
pub(crate) const HASH_HEADER_SIZE: usize = 0x400;
pub(crate) const HASH_DATA_SIZE: usize = HASH_BLOCK_SIZE - HASH_HEADER_SIZE;
pub(crate) const HASHES_PER_TABLE: usize = 16;
pub(crate) const HASH_TABLE_SIZE: usize = HASHES_PER_TABLE * nusdec_crypto::SHA1_SIZE;
