//! Directory table parsing.
//!
//! The table is a header, some per-partition headers, then a flat array of
//! 16-byte entries followed by a string table. Directory entries record
//! their parent and the index one past their last descendant; files only
//! know which content holds them. Parents of files are recovered from the
//! directory ranges, the tree itself is then built from parent indices
//! alone, and every entry is checked to reach the root without looping.

use crate::consts::*;
use crate::error::{ErrorKind, Result, Structure};
use crate::models::{EntryId, EntryKind, FileData, TitleManifest, VirtualEntry, VirtualTree};
use crate::reader::{ByteReader, null_terminated};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::instrument;

struct RawEntry {
    kind: u8,
    name_offset: u32,
    // Parent index for directories, scaled offset for files.
    first: u32,
    // End index for directories, size for files.
    second: u32,
    flags: u16,
    content_index: u16,
}

impl RawEntry {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let word = reader.be_u32()?;
        Ok(Self {
            kind: (word >> 24) as u8,
            name_offset: word & 0x00FF_FFFF,
            first: reader.be_u32()?,
            second: reader.be_u32()?,
            flags: reader.be_u16()?,
            content_index: reader.be_u16()?,
        })
    }

    fn is_dir(&self) -> bool {
        self.kind & FST_TYPE_DIRECTORY != 0
    }
}

impl VirtualTree {
    /// Parse the plaintext of a title's directory table. Every file must
    /// reference a content present in `manifest`.
    #[instrument(skip(data, manifest), fields(len = data.len()))]
    pub fn parse(data: &[u8], manifest: &TitleManifest) -> Result<Self> {
        let mut reader = ByteReader::new(data, Structure::DirectoryTable);
        if reader.array::<4>()? != FST_MAGIC {
            exn::bail!(ErrorKind::directory("missing FST magic"));
        }
        let offset_factor = u64::from(reader.be_u32()?);
        let secondary_count = reader.be_u32()? as usize;
        reader.seek(FST_HEADER_SIZE + secondary_count * FST_SECONDARY_SIZE)?;
        let entries_start = reader.position();

        let root = RawEntry::read(&mut reader)?;
        if !root.is_dir() {
            exn::bail!(ErrorKind::directory("first entry is not a directory"));
        }
        let count = root.second as usize;
        let names_start = count
            .checked_mul(FST_ENTRY_SIZE)
            .and_then(|len| len.checked_add(entries_start))
            .filter(|end| *end <= data.len() && count > 0);
        let Some(names_start) = names_start else {
            exn::bail!(ErrorKind::directory(format!("root claims {count} entries, which do not fit the table")));
        };
        let mut raw = Vec::with_capacity(count);
        raw.push(root);
        for _ in 1..count {
            raw.push(RawEntry::read(&mut reader)?);
        }
        let names = &data[names_start..];

        let parents = resolve_parents(&raw)?;
        check_acyclic(&parents)?;

        let mut entry_names = Vec::with_capacity(count);
        entry_names.push(String::new());
        for (i, entry) in raw.iter().enumerate().skip(1) {
            entry_names.push(read_name(names, entry.name_offset as usize, i)?);
        }

        let mut children = vec![Vec::new(); count];
        for (i, parent) in parents.iter().enumerate().skip(1) {
            if let Some(parent) = parent {
                children[*parent].push(EntryId(i));
            }
        }

        let mut entries = Vec::with_capacity(count);
        let mut paths = BTreeMap::new();
        for (i, (entry, children)) in raw.iter().zip(children).enumerate() {
            let path = build_path(&parents, &entry_names, i);
            let kind = if entry.is_dir() {
                EntryKind::Directory(children)
            } else {
                let Some(content) = manifest.content_by_index(entry.content_index) else {
                    exn::bail!(ErrorKind::directory(format!(
                        "{path} references content index {}, which is not in the manifest",
                        entry.content_index
                    )));
                };
                let offset = if entry.flags & FST_FLAG_RAW_OFFSET != 0 {
                    u64::from(entry.first)
                } else {
                    u64::from(entry.first) * offset_factor
                };
                EntryKind::File(FileData {
                    content_id: content.id,
                    content_index: entry.content_index,
                    offset,
                    size: u64::from(entry.second),
                    flags: entry.flags,
                    in_package: entry.kind & FST_TYPE_NOT_IN_PACKAGE == 0,
                })
            };
            match paths.entry(path.clone()) {
                Entry::Occupied(_) => exn::bail!(ErrorKind::directory(format!("{path} appears more than once"))),
                Entry::Vacant(slot) => {
                    slot.insert(EntryId(i));
                },
            }
            entries.push(VirtualEntry {
                name: entry_names[i].clone(),
                path,
                parent: parents[i].map(EntryId),
                kind,
            });
        }

        let tree = VirtualTree { entries, paths };
        tracing::debug!(entries = tree.len(), files = tree.files().count(), "parsed directory table");
        Ok(tree)
    }
}

/// Directories name their parent. Files belong to the innermost directory
/// whose range still covers them.
fn resolve_parents(raw: &[RawEntry]) -> Result<Vec<Option<usize>>> {
    let count = raw.len();
    let mut parents = vec![None; count];
    let mut open = vec![0usize];
    for (i, entry) in raw.iter().enumerate().skip(1) {
        while open.last().is_some_and(|&dir| dir != 0 && raw[dir].second as usize <= i) {
            open.pop();
        }
        if entry.is_dir() {
            let parent = entry.first as usize;
            if parent >= count || !raw[parent].is_dir() {
                exn::bail!(ErrorKind::directory(format!("entry {i} names {parent} as its parent directory")));
            }
            let end = entry.second as usize;
            if end <= i || end > count {
                exn::bail!(ErrorKind::directory(format!("directory entry {i} ends at {end}, outside {i}..={count}")));
            }
            parents[i] = Some(parent);
            open.push(i);
        } else {
            parents[i] = open.last().copied();
        }
    }
    Ok(parents)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Reaches,
}

/// Every entry must reach the root by following parents.
fn check_acyclic(parents: &[Option<usize>]) -> Result<()> {
    let mut marks = vec![Mark::Unvisited; parents.len()];
    marks[0] = Mark::Reaches;
    for start in 1..parents.len() {
        let mut trail = Vec::new();
        let mut current = start;
        loop {
            match marks[current] {
                Mark::Reaches => break,
                Mark::Visiting => {
                    exn::bail!(ErrorKind::directory(format!("entry {current} is its own ancestor")))
                },
                Mark::Unvisited => {
                    marks[current] = Mark::Visiting;
                    trail.push(current);
                    let Some(parent) = parents[current] else {
                        exn::bail!(ErrorKind::directory(format!("entry {current} has no parent")));
                    };
                    current = parent;
                },
            }
        }
        for visited in trail {
            marks[visited] = Mark::Reaches;
        }
    }
    Ok(())
}

fn read_name(names: &[u8], offset: usize, index: usize) -> Result<String> {
    let Some(bytes) = null_terminated(names, offset) else {
        exn::bail!(ErrorKind::directory(format!("name of entry {index} runs past the string table")));
    };
    let Ok(name) = std::str::from_utf8(bytes) else {
        exn::bail!(ErrorKind::directory(format!("name of entry {index} is not valid UTF-8")));
    };
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        exn::bail!(ErrorKind::directory(format!("entry {index} has unusable name {name:?}")));
    }
    Ok(name.to_string())
}

fn build_path(parents: &[Option<usize>], names: &[String], index: usize) -> String {
    let mut components = Vec::new();
    let mut current = Some(index);
    while let Some(i) = current.filter(|&i| i != 0) {
        components.push(names[i].as_str());
        current = parents[i];
    }
    components.reverse();
    format!("/{}", components.join("/"))
}
