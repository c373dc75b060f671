//! Local directory byte source.
//!
//! Reads a title that has already been downloaded into a directory, in any
//! of the file layouts common download tools produce.

use crate::backend::{BoxSyncRead, ByteSource};
use crate::error::{ErrorKind, Result};
use crate::models::Resource;
use async_trait::async_trait;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A title stored as loose files in one directory.
///
/// File names are matched against, in order:
///
/// | Resource    | Candidates                                 |
/// |-------------|--------------------------------------------|
/// | manifest    | `title.tmd`, `tmd`                         |
/// | ticket      | `title.tik`, `cetk`                        |
/// | content     | `<id>.app`, `<id>` (hex, either case)      |
/// | hash tree   | `<id>.h3` (hex, either case)               |
///
/// # Examples
///
/// ```no_run
/// use nusdec_storage::backend::LocalSource;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = LocalSource::new("downloads", "/path/to/0005000E1010ED00")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalSource {
    name: String,
    root: PathBuf,
}
impl LocalSource {
    /// Create a source over an existing directory.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if `root` is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    fn candidates(resource: Resource) -> Vec<String> {
        match resource {
            Resource::Manifest => vec!["title.tmd".to_string(), "tmd".to_string()],
            Resource::Ticket => vec!["title.tik".to_string(), "cetk".to_string()],
            Resource::Content(id) => {
                vec![format!("{id:08x}.app"), format!("{id:08X}.app"), format!("{id:08x}"), format!("{id:08X}")]
            },
            Resource::HashTree(id) => vec![format!("{id:08x}.h3"), format!("{id:08X}.h3")],
        }
    }

    /// First candidate file that exists.
    async fn locate(&self, resource: Resource) -> Result<PathBuf> {
        for candidate in Self::candidates(resource) {
            let path = self.root.join(candidate);
            if fs::try_exists(&path).await.map_err(|e| Self::map_io_error(e, resource, &path))? {
                return Ok(path);
            }
        }
        exn::bail!(ErrorKind::NotFound(resource))
    }

    fn map_io_error(e: std::io::Error, resource: Resource, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(resource),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl ByteSource for LocalSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, resource: Resource) -> Result<Vec<u8>> {
        let path = self.locate(resource).await?;
        tracing::trace!(source = %self.name, path = %path.display(), "reading resource");
        Ok(fs::read(&path).await.map_err(|e| Self::map_io_error(e, resource, &path))?)
    }

    async fn read_range(&self, resource: Resource, range: Range<u64>) -> Result<Vec<u8>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let path = self.locate(resource).await?;
        let mut file = fs::File::open(&path).await.map_err(|e| Self::map_io_error(e, resource, &path))?;
        file.seek(SeekFrom::Start(range.start)).await.map_err(ErrorKind::Io)?;
        let mut buffer = Vec::with_capacity((range.end - range.start) as usize);
        file.take(range.end - range.start).read_to_end(&mut buffer).await.map_err(ErrorKind::Io)?;
        Ok(buffer)
    }

    async fn reader(&self, resource: Resource, range: Range<u64>) -> Result<BoxSyncRead> {
        let path = self.locate(resource).await?;
        let file = fs::File::open(&path).await.map_err(|e| Self::map_io_error(e, resource, &path))?;
        let mut file = file.into_std().await;
        // Seeking a regular file doesn't block for any meaningful time.
        file.seek(SeekFrom::Start(range.start)).map_err(ErrorKind::Io)?;
        Ok(Box::new(file.take(range.end.saturating_sub(range.start))))
    }
}
