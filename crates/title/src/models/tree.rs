use derive_more::Display;
use std::collections::BTreeMap;

/// Index of an entry within a [`VirtualTree`]. Matches the entry's position
/// in the directory table it was parsed from.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("#{_0}")]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    pub const ROOT: EntryId = EntryId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Where a file's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileData {
    pub content_id: u32,
    pub content_index: u16,
    /// Offset into the content's plaintext, already scaled to bytes.
    pub offset: u64,
    pub size: u64,
    pub flags: u16,
    /// False for entries the directory table marks as shipped outside the
    /// title package.
    pub in_package: bool,
}

impl FileData {
    /// Plaintext byte range within the owning content.
    pub fn range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Children are kept in directory-table order.
    Directory(Vec<EntryId>),
    File(FileData),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEntry {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) parent: Option<EntryId>,
    pub(crate) kind: EntryKind,
}

impl VirtualEntry {
    /// Final path component; empty for the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rooted, `/`-separated path. The root is `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory(_))
    }

    pub fn file(&self) -> Option<&FileData> {
        match &self.kind {
            EntryKind::File(data) => Some(data),
            EntryKind::Directory(_) => None,
        }
    }

    pub fn children(&self) -> &[EntryId] {
        match &self.kind {
            EntryKind::Directory(children) => children,
            EntryKind::File(_) => &[],
        }
    }
}

/// The virtual filesystem described by a title's directory table.
///
/// Entries live in a flat arena indexed by [`EntryId`]; parent and child
/// links are ids, never references. Every path is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualTree {
    pub(crate) entries: Vec<VirtualEntry>,
    pub(crate) paths: BTreeMap<String, EntryId>,
}

impl VirtualTree {
    pub fn root(&self) -> &VirtualEntry {
        &self.entries[EntryId::ROOT.0]
    }

    pub fn entry(&self, id: EntryId) -> Option<&VirtualEntry> {
        self.entries.get(id.0)
    }

    /// Look up an entry by path. The leading `/` is optional.
    pub fn get(&self, path: &str) -> Option<&VirtualEntry> {
        let id = if path.starts_with('/') {
            self.paths.get(path)
        } else {
            self.paths.get(&format!("/{path}"))
        }?;
        self.entry(*id)
    }

    /// Number of entries, including the root.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root always exists.
        false
    }

    /// All paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = (&str, EntryId)> {
        self.paths.iter().map(|(path, id)| (path.as_str(), *id))
    }

    /// Depth-first pre-order walk from the root, children in table order.
    pub fn walk(&self) -> Walk<'_> {
        Walk { tree: self, stack: vec![EntryId::ROOT] }
    }

    /// Files in walk order.
    pub fn files(&self) -> impl Iterator<Item = (EntryId, &VirtualEntry, &FileData)> {
        self.walk().filter_map(|(id, entry)| entry.file().map(|data| (id, entry, data)))
    }
}

pub struct Walk<'a> {
    tree: &'a VirtualTree,
    stack: Vec<EntryId>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (EntryId, &'a VirtualEntry);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let entry = self.tree.entry(id)?;
        self.stack.extend(entry.children().iter().rev());
        Some((id, entry))
    }
}
