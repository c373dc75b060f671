//! Builders for encrypted test titles.
//!
//! Everything here produces bytes in the same layout a real title server
//! hands out, encrypted with caller-chosen keys, so the parsing and
//! decryption paths can be exercised end to end without real key material.
//! Available to other crates through the `mock` feature.

use crate::consts::*;
use crate::keys::{KeyIndex, SharedKeys, TitleKey};
use crate::models::{ContentRecord, ContentType};
use nusdec_crypto::{Iv, Key, Sha1Digest, encrypt_in_place, iv_from_index, iv_from_title_id, sha256};
use std::collections::{BTreeMap, BTreeSet};

pub const MANIFEST_ISSUER: &str = "Root-CA00000003-CP0000000b";
pub const TICKET_ISSUER: &str = "Root-CA00000003-XS0000000c";

const SIGNED_BODY: usize = 0x140;
const OFFSET_FACTOR: u32 = 0x20;

/// One content as it would be downloaded, plus the record describing it.
#[derive(Debug, Clone)]
pub struct FixtureContent {
    pub record: ContentRecord,
    pub ciphertext: Vec<u8>,
    /// The hash-tree file, for hashed contents only.
    pub hash_tree: Option<Vec<u8>>,
}

fn encrypt(key: &Key, iv: &Iv, data: &mut [u8]) {
    let Ok(()) = encrypt_in_place(key, iv, data) else {
        // Fixtures are test setup; a bad buffer here is a bug in the test.
        panic!("fixture buffer of {} bytes is not block aligned", data.len());
    };
}

/// Content id the builders give the content at `index`. Ids never equal
/// their index, not even in the low 16 bits.
pub fn content_id(index: u16) -> u32 {
    0x1000_0020 + u32::from(index)
}

fn pad_to(data: &mut Vec<u8>, multiple: usize) {
    data.resize(data.len().div_ceil(multiple) * multiple, 0);
}

/// A flat, encrypted content holding `plaintext`.
pub fn flat_content(key: &TitleKey, index: u16, plaintext: &[u8]) -> FixtureContent {
    let mut ciphertext = plaintext.to_vec();
    pad_to(&mut ciphertext, 16);
    encrypt(key.key(), &iv_from_index(index), &mut ciphertext);
    FixtureContent {
        record: ContentRecord {
            id: content_id(index),
            index,
            content_type: ContentType(ContentType::CONTENT | ContentType::ENCRYPTED),
            size: plaintext.len() as u64,
            digest: Sha1Digest::of(plaintext),
        },
        ciphertext,
        hash_tree: None,
    }
}

/// A flat content stored without encryption.
pub fn plain_content(index: u16, plaintext: &[u8]) -> FixtureContent {
    let mut ciphertext = plaintext.to_vec();
    pad_to(&mut ciphertext, 16);
    FixtureContent {
        record: ContentRecord {
            id: content_id(index),
            index,
            content_type: ContentType(ContentType::CONTENT),
            size: plaintext.len() as u64,
            digest: Sha1Digest::of(plaintext),
        },
        ciphertext,
        hash_tree: None,
    }
}

/// Pack `hashes` into 16-entry tables, zero-filling the last one.
fn tables(hashes: &[Sha1Digest]) -> Vec<Vec<u8>> {
    hashes
        .chunks(HASHES_PER_TABLE)
        .map(|chunk| {
            let mut table = chunk.iter().flat_map(|h| h.0).collect::<Vec<u8>>();
            table.resize(HASH_TABLE_SIZE, 0);
            table
        })
        .collect()
}

/// A hashed, encrypted content holding `plaintext`, zero-padded to whole
/// blocks.
pub fn hashed_content(key: &TitleKey, index: u16, plaintext: &[u8]) -> FixtureContent {
    let blocks = plaintext.len().div_ceil(HASH_DATA_SIZE).max(1);
    let mut data = plaintext.to_vec();
    data.resize(blocks * HASH_DATA_SIZE, 0);
    let salt = index as u8;

    let h0: Vec<Sha1Digest> = data
        .chunks(HASH_DATA_SIZE)
        .enumerate()
        .map(|(block, chunk)| {
            let mut digest = Sha1Digest::of(chunk);
            if block % HASHES_PER_TABLE == 0 {
                digest.0[1] ^= salt;
            }
            digest
        })
        .collect();
    let h0_tables = tables(&h0);
    let h1: Vec<Sha1Digest> = h0_tables.iter().map(|t| Sha1Digest::of(t)).collect();
    let h1_tables = tables(&h1);
    let h2: Vec<Sha1Digest> = h1_tables.iter().map(|t| Sha1Digest::of(t)).collect();
    let h2_tables = tables(&h2);
    let h3: Vec<u8> = h2_tables.iter().flat_map(|t| Sha1Digest::of(t).0).collect();

    let mut ciphertext = Vec::with_capacity(blocks * HASH_BLOCK_SIZE);
    for (block, chunk) in data.chunks(HASH_DATA_SIZE).enumerate() {
        let mut header = Vec::with_capacity(HASH_HEADER_SIZE);
        header.extend_from_slice(&h0_tables[block / HASHES_PER_TABLE]);
        header.extend_from_slice(&h1_tables[block / HASHES_PER_TABLE.pow(2)]);
        header.extend_from_slice(&h2_tables[block / HASHES_PER_TABLE.pow(3)]);
        header.resize(HASH_HEADER_SIZE, 0);
        encrypt(key.key(), &iv_from_index(index), &mut header);

        let mut iv: Iv = [0; 16];
        iv.copy_from_slice(&h0[block].0[..16]);
        if block % HASHES_PER_TABLE == 0 {
            iv[1] ^= salt;
        }
        let mut body = chunk.to_vec();
        encrypt(key.key(), &iv, &mut body);

        ciphertext.extend_from_slice(&header);
        ciphertext.extend_from_slice(&body);
    }

    FixtureContent {
        record: ContentRecord {
            id: content_id(index),
            index,
            content_type: ContentType(ContentType::CONTENT | ContentType::ENCRYPTED | ContentType::HASHED),
            size: ciphertext.len() as u64,
            digest: Sha1Digest::of(&h3),
        },
        ciphertext,
        hash_tree: Some(h3),
    }
}

fn signed_header(body_len: usize) -> Vec<u8> {
    let mut data = vec![0u8; SIGNED_BODY + body_len];
    data[..4].copy_from_slice(&SIG_RSA2048_SHA256.to_be_bytes());
    data
}

fn put(data: &mut [u8], offset: usize, bytes: &[u8]) {
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn manifest_header(data: &mut [u8], format_version: u8, title_id: u64, title_version: u16, count: usize) {
    let h = SIGNED_BODY;
    put(data, h + TMD_ISSUER, MANIFEST_ISSUER.as_bytes());
    data[h + TMD_VERSION] = format_version;
    put(data, h + TMD_SYSTEM_VERSION, &0x0005_0010_1000_400Au64.to_be_bytes());
    put(data, h + TMD_TITLE_ID, &title_id.to_be_bytes());
    put(data, h + TMD_TITLE_TYPE, &0x100u32.to_be_bytes());
    put(data, h + TMD_TITLE_VERSION, &title_version.to_be_bytes());
    put(data, h + TMD_CONTENT_COUNT, &(count as u16).to_be_bytes());
}

fn record_bytes(record: &ContentRecord, size: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(size);
    bytes.extend_from_slice(&record.id.to_be_bytes());
    bytes.extend_from_slice(&record.index.to_be_bytes());
    bytes.extend_from_slice(&record.content_type.0.to_be_bytes());
    bytes.extend_from_slice(&record.size.to_be_bytes());
    bytes.extend_from_slice(record.digest.as_bytes());
    bytes.resize(size, 0);
    bytes
}

/// A version 1 manifest with a valid content-info hash chain.
pub fn manifest_v1(title_id: u64, title_version: u16, records: &[ContentRecord]) -> Vec<u8> {
    let mut data = signed_header(TMD_V1_RECORDS + records.len() * TMD_V1_RECORD_SIZE);
    manifest_header(&mut data, 1, title_id, title_version, records.len());
    let h = SIGNED_BODY;
    let records: Vec<u8> = records.iter().flat_map(|r| record_bytes(r, TMD_V1_RECORD_SIZE)).collect();
    put(&mut data, h + TMD_V1_RECORDS, &records);
    if !records.is_empty() {
        let count = (records.len() / TMD_V1_RECORD_SIZE) as u16;
        put(&mut data, h + TMD_INFO_TABLE + 2, &count.to_be_bytes());
        put(&mut data, h + TMD_INFO_TABLE + 4, &sha256(&records));
    }
    let table = sha256(&data[h + TMD_INFO_TABLE..h + TMD_V1_RECORDS]);
    put(&mut data, h + TMD_INFO_TABLE_HASH, &table);
    data
}

/// A version 0 manifest, as used by older titles.
pub fn manifest_v0(title_id: u64, title_version: u16, records: &[ContentRecord]) -> Vec<u8> {
    let mut data = signed_header(TMD_V0_RECORDS + records.len() * TMD_V0_RECORD_SIZE);
    manifest_header(&mut data, 0, title_id, title_version, records.len());
    let records: Vec<u8> = records.iter().flat_map(|r| record_bytes(r, TMD_V0_RECORD_SIZE)).collect();
    put(&mut data, SIGNED_BODY + TMD_V0_RECORDS, &records);
    data
}

/// A ticket carrying `title_key` wrapped with `shared_key`.
pub fn ticket(title_id: u64, title_key: &Key, shared_key: &Key, key_index: u8) -> Vec<u8> {
    let mut data = signed_header(0x210);
    let h = SIGNED_BODY;
    let mut wrapped = *title_key.as_bytes();
    encrypt(shared_key, &iv_from_title_id(title_id), &mut wrapped);
    put(&mut data, h + TIK_ISSUER, TICKET_ISSUER.as_bytes());
    put(&mut data, h + TIK_WRAPPED_KEY, &wrapped);
    put(&mut data, h + TIK_TICKET_ID, &0x0005_0000_0000_0001u64.to_be_bytes());
    put(&mut data, h + TIK_TITLE_ID, &title_id.to_be_bytes());
    data[h + TIK_KEY_INDEX] = key_index;
    data
}

/// A raw directory-table entry, written exactly as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FstEntry {
    Directory {
        name: String,
        parent: u32,
        end: u32,
    },
    File {
        name: String,
        content_index: u16,
        /// In units of the table's offset factor, unless `flags` says bytes.
        offset: u32,
        size: u32,
        flags: u16,
        in_package: bool,
    },
}

/// Serialize `entries` (the first must be the root) with one partition
/// header and names stored in entry order.
pub fn directory_table(entries: &[FstEntry], offset_factor: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&FST_MAGIC);
    data.extend_from_slice(&offset_factor.to_be_bytes());
    data.extend_from_slice(&1u32.to_be_bytes());
    data.resize(FST_HEADER_SIZE + FST_SECONDARY_SIZE, 0);

    let mut names = Vec::new();
    for entry in entries {
        let (kind, name, first, second, flags, content_index) = match entry {
            FstEntry::Directory { name, parent, end } => (FST_TYPE_DIRECTORY, name, *parent, *end, 0, 0),
            FstEntry::File { name, content_index, offset, size, flags, in_package } => {
                let kind = if *in_package { 0 } else { FST_TYPE_NOT_IN_PACKAGE };
                (kind, name, *offset, *size, *flags, *content_index)
            },
        };
        let word = (u32::from(kind) << 24) | names.len() as u32;
        names.extend_from_slice(name.as_bytes());
        names.push(0);
        data.extend_from_slice(&word.to_be_bytes());
        data.extend_from_slice(&first.to_be_bytes());
        data.extend_from_slice(&second.to_be_bytes());
        data.extend_from_slice(&flags.to_be_bytes());
        data.extend_from_slice(&content_index.to_be_bytes());
    }
    data.extend_from_slice(&names);
    data
}

#[derive(Default)]
struct Node {
    name: String,
    children: Vec<Node>,
    file: Option<(u16, u32, u32)>,
}

impl Node {
    fn insert(&mut self, components: &[&str], file: (u16, u32, u32)) {
        let Some((first, rest)) = components.split_first() else {
            return;
        };
        let position = match self.children.iter().position(|c| c.name == *first) {
            Some(position) => position,
            None => {
                self.children.push(Node { name: first.to_string(), ..Node::default() });
                self.children.len() - 1
            },
        };
        let child = &mut self.children[position];
        if rest.is_empty() {
            child.file = Some(file);
        } else {
            child.insert(rest, file);
        }
    }

    fn emit(&self, parent: u32, entries: &mut Vec<FstEntry>) {
        if let Some((content_index, offset, size)) = self.file {
            entries.push(FstEntry::File {
                name: self.name.clone(),
                content_index,
                offset: offset / OFFSET_FACTOR,
                size,
                flags: 0,
                in_package: true,
            });
            return;
        }
        let index = entries.len();
        entries.push(FstEntry::Directory { name: self.name.clone(), parent, end: 0 });
        for child in &self.children {
            child.emit(index as u32, entries);
        }
        let end = entries.len() as u32;
        if let FstEntry::Directory { end: slot, .. } = &mut entries[index] {
            *slot = end;
        }
    }
}

/// Builds a complete title: manifest, ticket, a directory table in content
/// 0 and one content per distinct index used by [`TitleBuilder::file`].
pub struct TitleBuilder {
    title_id: u64,
    title_version: u16,
    common_key: Key,
    title_key: TitleKey,
    key_index: u8,
    files: Vec<(String, u16, Vec<u8>)>,
    hashed: BTreeSet<u16>,
    corrupt: BTreeSet<u16>,
}

impl TitleBuilder {
    pub fn new(title_id: u64) -> Self {
        Self {
            title_id,
            title_version: 0,
            common_key: Key::new(*b"fixture-common-k"),
            title_key: TitleKey::new(Key::new(*b"fixture-title-ke")),
            key_index: KeyIndex::Common.as_u8(),
            files: Vec::new(),
            hashed: BTreeSet::new(),
            corrupt: BTreeSet::new(),
        }
    }

    pub fn title_version(mut self, version: u16) -> Self {
        self.title_version = version;
        self
    }

    pub fn keys(mut self, common_key: Key, title_key: Key) -> Self {
        self.common_key = common_key;
        self.title_key = TitleKey::new(title_key);
        self
    }

    /// Add a file at `path` (without a leading `/`) stored in the content
    /// with `content_index`. Index 0 is reserved for the directory table.
    pub fn file(mut self, path: &str, content_index: u16, data: impl Into<Vec<u8>>) -> Self {
        assert_ne!(content_index, 0, "content 0 holds the directory table");
        self.files.push((path.trim_start_matches('/').to_string(), content_index, data.into()));
        self
    }

    /// Store the content with `content_index` in hash-tree mode.
    pub fn hashed(mut self, content_index: u16) -> Self {
        self.hashed.insert(content_index);
        self
    }

    /// Alter the manifest's recorded digest for `content_index`. The
    /// manifest's own hash chain is still computed over the altered record.
    pub fn corrupt_digest(mut self, content_index: u16) -> Self {
        self.corrupt.insert(content_index);
        self
    }

    pub fn build(self) -> FixtureTitle {
        let mut plaintexts: BTreeMap<u16, Vec<u8>> = BTreeMap::new();
        let mut root = Node::default();
        let mut files = BTreeMap::new();
        for (path, content_index, data) in &self.files {
            let plaintext = plaintexts.entry(*content_index).or_default();
            pad_to(plaintext, OFFSET_FACTOR as usize);
            let offset = plaintext.len() as u32;
            plaintext.extend_from_slice(data);
            let components: Vec<&str> = path.split('/').collect();
            root.insert(&components, (*content_index, offset, data.len() as u32));
            files.insert(format!("/{path}"), data.clone());
        }

        let mut entries = Vec::new();
        root.emit(0, &mut entries);
        plaintexts.insert(0, directory_table(&entries, OFFSET_FACTOR));

        let contents: Vec<FixtureContent> = plaintexts
            .iter()
            .map(|(index, plaintext)| {
                let mut content = if self.hashed.contains(index) {
                    hashed_content(&self.title_key, *index, plaintext)
                } else {
                    flat_content(&self.title_key, *index, plaintext)
                };
                if self.corrupt.contains(index) {
                    content.record.digest.0[0] ^= 0xFF;
                }
                content
            })
            .collect();

        let records: Vec<ContentRecord> = contents.iter().map(|c| c.record.clone()).collect();
        FixtureTitle {
            title_id: self.title_id,
            title_version: self.title_version,
            manifest: manifest_v1(self.title_id, self.title_version, &records),
            ticket: ticket(self.title_id, self.title_key.key(), &self.common_key, self.key_index),
            contents,
            common_key: self.common_key,
            title_key: self.title_key,
            files,
        }
    }
}

/// Output of [`TitleBuilder::build`].
#[derive(Debug, Clone)]
pub struct FixtureTitle {
    pub title_id: u64,
    pub title_version: u16,
    pub manifest: Vec<u8>,
    pub ticket: Vec<u8>,
    /// In index order, directory table first.
    pub contents: Vec<FixtureContent>,
    pub common_key: Key,
    pub title_key: TitleKey,
    /// Expected plaintext of every file, keyed by rooted path.
    pub files: BTreeMap<String, Vec<u8>>,
}

impl FixtureTitle {
    pub fn content(&self, index: u16) -> Option<&FixtureContent> {
        self.contents.iter().find(|c| c.record.index == index)
    }

    pub fn content_mut(&mut self, index: u16) -> Option<&mut FixtureContent> {
        self.contents.iter_mut().find(|c| c.record.index == index)
    }

    /// Shared keys able to unwrap this title's ticket.
    pub fn shared_keys(&self) -> SharedKeys {
        SharedKeys::new().with_common_key_override(self.common_key)
    }
}
