//! Title byte sources.
//!
//! This module defines the [`ByteSource`] trait, a read-only interface over
//! wherever a title's manifest, ticket and contents are stored (a local
//! directory, a content server, memory in tests).

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "remote")]
mod remote;

pub use self::local::LocalSource;
#[cfg(feature = "mock")]
pub use self::mock::MockSource;
#[cfg(feature = "remote")]
pub use self::remote::RemoteSource;
use crate::error::Result;
use crate::models::Resource;
use async_trait::async_trait;
use std::io::{Cursor, Read};
use std::ops::Range;

pub(crate) type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// Read access to the resources of a single title.
///
/// All methods are asynchronous so network sources can be used without
/// blocking. Readers returned by [`reader()`](Self::reader) are synchronous
/// and `'static`, for use inside
/// [`spawn_blocking`](tokio::task::spawn_blocking) where decryption runs.
///
/// # Examples
///
/// ```
/// use nusdec_storage::{ByteSource, Resource, error::Result};
///
/// async fn manifest_len(source: &dyn ByteSource) -> Result<usize> {
///     Ok(source.read(Resource::Manifest).await?.len())
/// }
/// ```
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Name of the source, for logging only.
    fn name(&self) -> &str;

    /// Read a whole resource.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the source
    /// does not have it.
    async fn read(&self, resource: Resource) -> Result<Vec<u8>>;

    /// Read the bytes of `range` within a resource.
    ///
    /// A range running past the end of the resource yields only the bytes
    /// that exist; callers that need an exact length must check it. The
    /// default implementation reads the whole resource and slices it, so
    /// sources that can do better should override it.
    async fn read_range(&self, resource: Resource, range: Range<u64>) -> Result<Vec<u8>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let mut data = self.read(resource).await?;
        let end = (range.end as usize).min(data.len());
        let start = (range.start as usize).min(end);
        data.truncate(end);
        data.drain(..start);
        Ok(data)
    }

    /// Open a streaming reader over `range` within a resource.
    ///
    /// The default implementation buffers [`read_range()`](Self::read_range).
    async fn reader(&self, resource: Resource, range: Range<u64>) -> Result<BoxSyncRead> {
        let data = self.read_range(resource, range).await?;
        Ok(Box::new(Cursor::new(data)))
    }
}
