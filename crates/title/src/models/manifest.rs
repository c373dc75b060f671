use derive_more::Display;
use nusdec_crypto::Sha1Digest;

/// Flags from a content record's type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentType(pub u16);

impl ContentType {
    pub const ENCRYPTED: u16 = 0x0001;
    pub const HASHED: u16 = 0x0002;
    pub const CONTENT: u16 = 0x2000;
    pub const OPTIONAL: u16 = 0x4000;
    pub const SHARED: u16 = 0x8000;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn is_encrypted(self) -> bool {
        self.contains(Self::ENCRYPTED)
    }

    /// Hashed contents carry a block-level hash tree instead of a single
    /// digest over the whole plaintext.
    pub fn is_hashed(self) -> bool {
        self.contains(Self::HASHED)
    }
}

/// How a content's plaintext is verified.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityMode {
    /// One SHA-1 over the whole plaintext.
    #[display("flat")]
    Flat,
    /// Per-block hashes rooted in a separate hash-tree file.
    #[display("hash tree")]
    HashTree,
}

/// One entry of the manifest's content table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    /// Identifier used to name and fetch the content.
    pub id: u32,
    /// Position in the title; also seeds the content IV.
    pub index: u16,
    pub content_type: ContentType,
    /// Ciphertext size. For flat contents this is also the plaintext size.
    pub size: u64,
    /// SHA-1 of the plaintext (flat) or of the hash-tree file (hashed).
    pub digest: Sha1Digest,
}

impl ContentRecord {
    pub fn integrity_mode(&self) -> IntegrityMode {
        if self.content_type.is_hashed() { IntegrityMode::HashTree } else { IntegrityMode::Flat }
    }
}

/// A parsed title manifest.
///
/// Contents keep the order they appear in; lookups by index or id scan the
/// table, which never holds more than a few hundred records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleManifest {
    pub format_version: u8,
    pub issuer: String,
    pub system_version: u64,
    pub title_id: u64,
    pub title_type: u32,
    pub group_id: u16,
    pub access_rights: u32,
    pub title_version: u16,
    pub boot_index: u16,
    pub contents: Vec<ContentRecord>,
}

impl TitleManifest {
    pub fn content_by_index(&self, index: u16) -> Option<&ContentRecord> {
        self.contents.iter().find(|c| c.index == index)
    }

    pub fn content_by_id(&self, id: u32) -> Option<&ContentRecord> {
        self.contents.iter().find(|c| c.id == id)
    }

    /// The content holding the directory table, which is always index 0.
    pub fn directory_content(&self) -> Option<&ContentRecord> {
        self.content_by_index(0)
    }

    /// Sum of all content sizes, as downloaded.
    pub fn total_size(&self) -> u64 {
        self.contents.iter().map(|c| c.size).sum()
    }
}
