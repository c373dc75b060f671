//! Per-title state shared by every read from one title.

use crate::error::{ErrorKind, Result, StorageResultExt, TitleResultExt};
use exn::{OptionExt, ResultExt};
use nusdec_storage::{Resource, SourceHandle};
use nusdec_title::models::FileData;
use nusdec_title::{
    ContentDecryptor, ContentRecord, HashTree, IntegrityMode, SharedKeys, Ticket, TitleKey, TitleKeySource,
    TitleManifest, VirtualTree,
};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::instrument;

/// An open title: its manifest and title key, plus the directory tree and
/// hash-tree files, which are fetched on first use and kept for the
/// lifetime of the session.
///
/// Everything a session holds is read-only once loaded, so one session can
/// serve any number of concurrent reads through `&self`.
pub struct Session {
    source: SourceHandle,
    manifest: TitleManifest,
    key: TitleKey,
    tree: OnceCell<Arc<VirtualTree>>,
    hash_trees: HashMap<u32, OnceCell<Arc<HashTree>>>,
}

impl Session {
    /// Fetch and parse the manifest, then resolve the title key.
    ///
    /// With an explicit `title_key` the ticket is never fetched. Otherwise
    /// the ticket's wrapped key is unwrapped with `keys`.
    ///
    /// # Errors
    ///
    /// [`Retrieval`](ErrorKind::Retrieval) if the manifest or ticket cannot
    /// be fetched, [`Format`](ErrorKind::Format) for a malformed manifest and
    /// [`KeyDerivation`](ErrorKind::KeyDerivation) for an unusable ticket or
    /// missing shared key.
    #[instrument(skip_all, fields(source = source.name()))]
    pub async fn open(source: SourceHandle, keys: &SharedKeys, title_key: Option<TitleKey>) -> Result<Self> {
        let bytes = source.read(Resource::Manifest).await.or_retrieve(Resource::Manifest)?;
        let manifest = TitleManifest::parse(&bytes).or_classify()?;
        let key_source = match title_key {
            Some(key) => TitleKeySource::Explicit(key),
            None => {
                let bytes = source.read(Resource::Ticket).await.or_retrieve(Resource::Ticket)?;
                let ticket = Ticket::parse(&bytes).or_raise(|| ErrorKind::KeyDerivation)?;
                if ticket.title_id != manifest.title_id {
                    tracing::warn!(
                        manifest = %format!("{:016X}", manifest.title_id),
                        ticket = %format!("{:016X}", ticket.title_id),
                        "ticket belongs to a different title"
                    );
                }
                TitleKeySource::Ticket(ticket)
            },
        };
        let key = key_source.resolve(keys).or_classify()?;
        Ok(Self::new(source, manifest, key))
    }

    /// A session over an already parsed manifest and resolved key.
    pub fn new(source: SourceHandle, manifest: TitleManifest, key: TitleKey) -> Self {
        let hash_trees = manifest
            .contents
            .iter()
            .filter(|record| record.integrity_mode() == IntegrityMode::HashTree)
            .map(|record| (record.id, OnceCell::new()))
            .collect();
        tracing::info!(
            title_id = %format!("{:016X}", manifest.title_id),
            version = manifest.title_version,
            contents = manifest.contents.len(),
            "opened title"
        );
        Self { source, manifest, key, tree: OnceCell::new(), hash_trees }
    }

    pub fn manifest(&self) -> &TitleManifest {
        &self.manifest
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// The title's directory tree, decrypted and parsed on first call.
    pub async fn tree(&self) -> Result<Arc<VirtualTree>> {
        if let Some(tree) = self.tree.get() {
            return Ok(Arc::clone(tree));
        }
        let tree = self
            .tree
            .get_or_try_init(|| async {
                let record = self.manifest.directory_content().ok_or_raise(|| ErrorKind::Format)?;
                let table = self.decrypt(record, 0..self.decryptor(record).plaintext_len()).await?;
                let tree = VirtualTree::parse(&table, &self.manifest).or_classify()?;
                tracing::debug!(entries = tree.len(), "parsed directory table");
                Ok::<_, crate::error::Error>(Arc::new(tree))
            })
            .await?;
        Ok(Arc::clone(tree))
    }

    /// Decrypt the bytes of one file.
    pub async fn read_file(&self, file: &FileData) -> Result<Vec<u8>> {
        if file.size == 0 {
            return Ok(Vec::new());
        }
        let record = self.manifest.content_by_index(file.content_index).ok_or_raise(|| ErrorKind::Format)?;
        self.decrypt(record, file.range()).await
    }

    /// Decrypt `range` of a content's plaintext, fetching only the
    /// ciphertext the read needs.
    #[instrument(level = "debug", skip(self, record), fields(content_id = record.id))]
    pub async fn decrypt(&self, record: &ContentRecord, range: Range<u64>) -> Result<Vec<u8>> {
        let decryptor = self.decryptor(record);
        let tree = match decryptor.mode() {
            IntegrityMode::Flat => None,
            IntegrityMode::HashTree => Some(self.hash_tree(record).await?),
        };
        let window = decryptor.ciphertext_window(&range);
        let resource = Resource::Content(record.id);
        let reader = self.source.reader(resource, window).await.or_retrieve(resource)?;
        tokio::task::spawn_blocking(move || decryptor.decrypt_range(reader, range, tree.as_deref()).or_classify())
            .await
            .or_raise(|| ErrorKind::Task)?
    }

    fn decryptor(&self, record: &ContentRecord) -> ContentDecryptor {
        ContentDecryptor::new(record.clone(), self.key)
    }

    /// The verified hash tree of a hashed content, fetched once.
    async fn hash_tree(&self, record: &ContentRecord) -> Result<Arc<HashTree>> {
        let cell = self.hash_trees.get(&record.id).ok_or_raise(|| ErrorKind::Format)?;
        if let Some(tree) = cell.get() {
            tracing::debug!(content_id = record.id, "hash tree cache hit");
            return Ok(Arc::clone(tree));
        }
        let tree = cell
            .get_or_try_init(|| async {
                let resource = Resource::HashTree(record.id);
                let bytes = self.source.read(resource).await.or_retrieve(resource)?;
                HashTree::verify(record, &bytes).map(Arc::new).or_classify()
            })
            .await?;
        Ok(Arc::clone(tree))
    }
}
