//! Mapping title paths onto the output directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Turn a rooted title path (`/code/app.xml`) into a relative filesystem
/// path that cannot leave the output directory.
///
/// Title paths are already checked when the directory table is parsed, but
/// the destination never trusts them: `..` components are rejected outright
/// instead of being resolved, as are null bytes and platform prefixes.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use nusdec_storage::validate_path;
///
/// assert_eq!(validate_path("/code/app.xml").unwrap(), Path::new("code/app.xml"));
/// assert_eq!(validate_path("meta//./meta.xml").unwrap(), Path::new("meta/meta.xml"));
/// assert!(validate_path("/content/../../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert!(validate_path("/").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let invalid = || ErrorKind::InvalidPath(path.as_ref().to_path_buf());
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix and truncate in syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) | Component::ParentDir => exn::bail!(invalid()),
        }
    }
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.into_iter().collect()),
    }
}
