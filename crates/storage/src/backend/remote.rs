//! Content server byte source.
//!
//! Fetches a title from an NUS-style HTTP server, where every resource of
//! a title lives under `<base>/<title id>/`.

use crate::backend::{BoxSyncRead, ByteSource};
use crate::error::{ErrorKind, Result};
use crate::models::Resource;
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use reqwest::{Client, Response, StatusCode, header};
use std::ops::Range;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::{StreamReader, SyncIoBridge};

/// Base URL of the public content server.
pub const DEFAULT_BASE_URL: &str = "http://ccs.cdn.wup.shop.nintendo.net/ccs/download";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A title served over HTTP.
///
/// Range reads are sent as `Range` requests. Servers that ignore the header
/// and answer `200 OK` are handled by slicing the full body. Readers stream
/// the response body, so a content is never held in memory whole.
pub struct RemoteSource {
    name: String,
    client: Client,
    base_url: String,
    title_id: u64,
    title_version: Option<u16>,
}
impl RemoteSource {
    /// Create a source for one title.
    ///
    /// Without a `title_version` the server's latest manifest is fetched.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        title_id: u64,
        title_version: Option<u16>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ErrorKind::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            title_id,
            title_version,
        })
    }

    pub(crate) fn url(&self, resource: Resource) -> String {
        let base = format!("{}/{:016x}", self.base_url, self.title_id);
        match resource {
            Resource::Manifest => match self.title_version {
                Some(version) => format!("{base}/tmd.{version}"),
                None => format!("{base}/tmd"),
            },
            Resource::Ticket => format!("{base}/cetk"),
            Resource::Content(id) => format!("{base}/{id:08x}"),
            Resource::HashTree(id) => format!("{base}/{id:08x}.h3"),
        }
    }

    /// Send a request, failing on any status but success or `416`.
    async fn send(&self, resource: Resource, range: Option<&Range<u64>>) -> Result<Response> {
        let url = self.url(resource);
        let mut request = self.client.get(&url);
        if let Some(range) = range {
            request = request.header(header::RANGE, format!("bytes={}-{}", range.start, range.end - 1));
        }
        tracing::debug!(source = %self.name, %url, ?range, "requesting resource");
        let response = request.send().await.map_err(|e| ErrorKind::Network(format!("{url}: {e}")))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            exn::bail!(ErrorKind::NotFound(resource));
        }
        if !status.is_success() && status != StatusCode::RANGE_NOT_SATISFIABLE {
            exn::bail!(ErrorKind::Network(format!("{url}: HTTP {status}")));
        }
        Ok(response)
    }

    async fn fetch(&self, resource: Resource, range: Option<&Range<u64>>) -> Result<(StatusCode, Vec<u8>)> {
        let response = self.send(resource, range).await?;
        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok((status, Vec::new()));
        }
        let url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .or_raise(|| ErrorKind::Network(format!("{url}: failed to read response body")))?;
        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl ByteSource for RemoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, resource: Resource) -> Result<Vec<u8>> {
        let (_, body) = self.fetch(resource, None).await?;
        Ok(body)
    }

    async fn read_range(&self, resource: Resource, range: Range<u64>) -> Result<Vec<u8>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let (status, mut body) = self.fetch(resource, Some(&range)).await?;
        if status == StatusCode::PARTIAL_CONTENT {
            body.truncate((range.end - range.start) as usize);
            return Ok(body);
        }
        tracing::trace!(source = %self.name, %resource, "server ignored range request");
        let end = (range.end as usize).min(body.len());
        let start = (range.start as usize).min(end);
        body.truncate(end);
        body.drain(..start);
        Ok(body)
    }

    async fn reader(&self, resource: Resource, range: Range<u64>) -> Result<BoxSyncRead> {
        if range.is_empty() {
            return Ok(Box::new(std::io::empty()));
        }
        let response = self.send(resource, Some(&range)).await?;
        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(Box::new(std::io::empty()));
        }
        let url = response.url().to_string();
        let mut body = StreamReader::new(Box::pin(response.bytes_stream().map_err(std::io::Error::other)));
        if status != StatusCode::PARTIAL_CONTENT {
            tracing::trace!(source = %self.name, %resource, "server ignored range request");
            tokio::io::copy(&mut (&mut body).take(range.start), &mut tokio::io::sink())
                .await
                .or_raise(|| ErrorKind::Network(format!("{url}: failed to skip to offset {}", range.start)))?;
        }
        Ok(Box::new(SyncIoBridge::new(body.take(range.end - range.start))))
    }
}
