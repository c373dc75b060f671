//! Extraction destination.
//!
//! Files are written to a temporary file next to their destination and
//! renamed into place once complete, so an interrupted or failed write
//! never leaves a partial file behind under the final name.

use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use exn::ResultExt;
use std::fs::create_dir_all as sync_create_dir;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A directory that extracted files are written under.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}
impl OutputDir {
    /// Open (creating if needed) an output directory.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if `root` is relative
    /// or is an existing non-directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Happens once per run; not worth making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination of a rooted title path.
    pub fn target(&self, virtual_path: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(virtual_path)?))
    }

    pub async fn exists(&self, virtual_path: &str) -> Result<bool> {
        let target = self.target(virtual_path)?;
        Ok(fs::try_exists(&target).await.map_err(|e| Self::map_io_error(e, &target))?)
    }

    /// Write `data` to the destination of `virtual_path`, replacing any
    /// existing file. Returns the destination path.
    #[tracing::instrument(level = "debug", skip(self, data), fields(bytes = data.len()))]
    pub async fn write_atomic(&self, virtual_path: &str, data: Vec<u8>) -> Result<PathBuf> {
        let target = self.target(virtual_path)?;
        let Some(parent) = target.parent().map(Path::to_path_buf) else {
            exn::bail!(ErrorKind::InvalidPath(target));
        };
        fs::create_dir_all(&parent).await.map_err(|e| Self::map_io_error(e, &parent))?;
        let destination = target.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut temp = tempfile::Builder::new()
                .prefix(".nusdec-")
                .suffix(".part")
                .tempfile_in(&parent)
                .map_err(|e| Self::map_io_error(e, &parent))?;
            temp.write_all(&data).map_err(ErrorKind::Io)?;
            temp.as_file().sync_all().map_err(ErrorKind::Io)?;
            // On failure the temporary file is dropped, and deleted with it.
            temp.persist(&destination).map_err(|e| Self::map_io_error(e.error, &destination))?;
            Ok(())
        })
        .await
        .or_raise(|| ErrorKind::BackendError("write task panicked or was cancelled".to_string()))??;
        Ok(target)
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> (tempfile::TempDir, OutputDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let output = OutputDir::new(temp_dir.path().join("out")).unwrap();
        (temp_dir, output)
    }

    fn leftovers(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in std::fs::read_dir(current).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.file_name().unwrap().to_string_lossy().starts_with(".nusdec-") {
                    found.push(path);
                }
            }
        }
        found
    }

    #[test]
    fn test_new_requires_absolute() {
        assert!(OutputDir::new("relative/out").is_err());
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("file"), b"").unwrap();
        assert!(OutputDir::new(temp_dir.path().join("file")).is_err());
        assert!(OutputDir::new(temp_dir.path().join("a/b")).unwrap().root().is_dir());
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let (_dir, output) = output();
        let path = output.write_atomic("/code/app.xml", b"<app/>".to_vec()).await.unwrap();
        assert_eq!(path, output.root().join("code/app.xml"));
        assert_eq!(std::fs::read(&path).unwrap(), b"<app/>");
        assert!(output.exists("/code/app.xml").await.unwrap());
        assert!(!output.exists("/code/other.xml").await.unwrap());
        assert!(leftovers(output.root()).is_empty());
    }

    #[tokio::test]
    async fn test_write_replaces() {
        let (_dir, output) = output();
        output.write_atomic("/a.bin", vec![1; 64]).await.unwrap();
        let path = output.write_atomic("/a.bin", vec![2; 4]).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), vec![2; 4]);
    }

    #[tokio::test]
    async fn test_escaping_paths_rejected() {
        let (dir, output) = output();
        let err = output.write_atomic("/../escaped.bin", vec![0]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert!(!dir.path().join("escaped.bin").exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing() {
        let (_dir, output) = output();
        // A directory in the way makes the final rename fail.
        std::fs::create_dir_all(output.root().join("blocked/inner")).unwrap();
        assert!(output.write_atomic("/blocked", vec![1, 2, 3]).await.is_err());
        assert!(leftovers(output.root()).is_empty());
        assert!(output.root().join("blocked").is_dir());
    }
}
