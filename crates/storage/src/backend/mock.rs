//! In-memory byte source for testing.

use crate::backend::ByteSource;
use crate::error::{ErrorKind, Result};
use crate::models::Resource;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use tokio::sync::RwLock;

/// In-memory byte source for testing.
///
/// Resources are held in a `HashMap`, and every request is recorded so
/// tests can assert what was (and wasn't) fetched. Selected resources can
/// be made to fail with a network error.
///
/// # Examples
///
/// ```
/// use nusdec_storage::{ByteSource, Resource, backend::MockSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MockSource::with_resources([(Resource::Manifest, b"tmd".to_vec())]);
/// assert_eq!(source.read(Resource::Manifest).await?, b"tmd");
/// assert_eq!(source.requests(Resource::Manifest).await, vec![0..3]);
/// # Ok(())
/// # }
/// ```
pub struct MockSource {
    name: String,
    resources: RwLock<HashMap<Resource, Vec<u8>>>,
    failing: RwLock<HashSet<Resource>>,
    requests: RwLock<Vec<(Resource, Range<u64>)>>,
}

impl MockSource {
    pub fn with_resources(resources: impl IntoIterator<Item = (Resource, Vec<u8>)>) -> Self {
        Self {
            name: "mock".to_string(),
            resources: RwLock::new(resources.into_iter().collect()),
            failing: RwLock::new(HashSet::new()),
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Change the name of the mock source.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub async fn insert(&self, resource: Resource, data: Vec<u8>) {
        self.resources.write().await.insert(resource, data);
    }

    pub async fn remove(&self, resource: Resource) {
        self.resources.write().await.remove(&resource);
    }

    /// Make every future request for `resource` fail with a network error.
    pub async fn fail(&self, resource: Resource) {
        self.failing.write().await.insert(resource);
    }

    /// Byte ranges requested for `resource`, in request order. Whole reads
    /// are recorded as the full length of the resource.
    pub async fn requests(&self, resource: Resource) -> Vec<Range<u64>> {
        self.requests.read().await.iter().filter(|(r, _)| *r == resource).map(|(_, range)| range.clone()).collect()
    }

    /// Total bytes handed out for `resource`.
    pub async fn bytes_served(&self, resource: Resource) -> u64 {
        let len = self.resources.read().await.get(&resource).map(|d| d.len() as u64).unwrap_or(0);
        self.requests(resource).await.iter().map(|range| range.end.min(len).saturating_sub(range.start)).sum()
    }

    async fn fetch(&self, resource: Resource, range: Option<Range<u64>>) -> Result<Vec<u8>> {
        if self.failing.read().await.contains(&resource) {
            exn::bail!(ErrorKind::Network(format!("simulated failure fetching {resource}")));
        }
        let resources = self.resources.read().await;
        let Some(data) = resources.get(&resource) else {
            exn::bail!(ErrorKind::NotFound(resource));
        };
        let range = range.unwrap_or(0..data.len() as u64);
        self.requests.write().await.push((resource, range.clone()));
        let end = (range.end as usize).min(data.len());
        let start = (range.start as usize).min(end);
        Ok(data[start..end].to_vec())
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::with_resources([])
    }
}

#[async_trait]
impl ByteSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, resource: Resource) -> Result<Vec<u8>> {
        self.fetch(resource, None).await
    }

    async fn read_range(&self, resource: Resource, range: Range<u64>) -> Result<Vec<u8>> {
        self.fetch(resource, Some(range)).await
    }
}
