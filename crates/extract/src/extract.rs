//! Selective, concurrent extraction of a title's files.

use crate::error::{ErrorKind, Result};
use crate::models::{EntryReport, ExtractionReport, Outcome};
use crate::session::Session;
use async_stream::stream;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use nusdec_storage::OutputDir;
use nusdec_title::models::FileData;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What to do when a destination file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Leave the existing file alone and report the entry as skipped.
    #[default]
    SkipExisting,
    Force,
}

/// Which files to extract, where to, and how.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// `None` selects everything.
    pattern: Option<Regex>,
    output: OutputDir,
    overwrite: OverwritePolicy,
    concurrency: usize,
    cancel: CancellationToken,
}

impl ExtractionRequest {
    /// Extract every file into `output`, skipping existing files, four at a
    /// time.
    pub fn new(output: OutputDir) -> Self {
        Self {
            pattern: None,
            output,
            overwrite: OverwritePolicy::default(),
            concurrency: 4,
            cancel: CancellationToken::new(),
        }
    }

    /// Only extract files whose path the regex matches in full, either as a
    /// rooted path (`/code/app.xml`) or relative to the root (`code/app.xml`).
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).or_raise(|| ErrorKind::Pattern(pattern.to_string()))?;
        self.pattern = Some(regex);
        Ok(self)
    }

    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Files processed at once. Values below one are raised to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stop scheduling new files once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn output(&self) -> &OutputDir {
        &self.output
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn matches(&self, path: &str) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        pattern.is_match(path) || path.strip_prefix('/').is_some_and(|relative| pattern.is_match(relative))
    }
}

/// Progress events emitted by [`extract_stream`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete) exactly once, with the
///    number of selected files.
/// 3. [`Extracted`](Self::Extracted) once per started file, in completion
///    order.
/// 4. [`Complete`](Self::Complete) exactly once, with every result in walk
///    order.
///
/// If the directory tree cannot be loaded the stream yields that error and
/// ends without [`Complete`](Self::Complete). Per-file failures never end
/// the stream; they are reported as [`Outcome::Failed`].
#[derive(Debug, Clone)]
pub enum ExtractEvent {
    Started,
    DiscoveryComplete(u64),
    Extracted(EntryReport),
    Complete(ExtractionReport),
}

struct Selected {
    ordinal: usize,
    path: String,
    file: FileData,
}

/// Stream [`ExtractEvent`]s while extracting the files of `session` that
/// `request` selects.
///
/// Files in the package whose path matches are numbered in walk order
/// (depth first, children in table order), then decrypted and written up
/// to the request's concurrency at a time. Files the directory table marks
/// as stored outside the package are never selected.
pub fn extract_stream<'a>(
    session: &'a Session,
    request: &'a ExtractionRequest,
) -> impl Stream<Item = Result<ExtractEvent>> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield Ok(ExtractEvent::Started);

        let tree = match session.tree().await {
            Ok(tree) => tree,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        let selected: Vec<Selected> = tree
            .files()
            .filter(|(_, entry, file)| {
                if !file.in_package {
                    tracing::trace!(path = entry.path(), "not in package");
                }
                file.in_package && request.matches(entry.path())
            })
            .enumerate()
            .map(|(ordinal, (_, entry, file))| Selected { ordinal, path: entry.path().to_string(), file: *file })
            .collect();
        tracing::info!(selected = selected.len(), total = tree.files().count(), "selected files");
        yield Ok(ExtractEvent::DiscoveryComplete(u64::try_from(selected.len()).unwrap_or(u64::MAX)));

        let mut pending = selected.into_iter();
        let mut processing = FuturesUnordered::new();
        let mut entries = Vec::new();
        let mut cancelled = false;
        loop {
            while !cancelled && processing.len() < request.concurrency {
                if request.cancel.is_cancelled() {
                    cancelled = !pending.as_slice().is_empty();
                    if cancelled {
                        tracing::warn!(remaining = pending.len(), "extraction cancelled");
                    }
                    break;
                }
                match pending.next() {
                    Some(entry) => processing.push(extract_entry(session, request, entry)),
                    None => break,
                }
            }
            let Some(report) = processing.next().await else {
                break;
            };
            yield Ok(ExtractEvent::Extracted(report.clone()));
            entries.push(report);
        }

        entries.sort_by_key(|entry| entry.ordinal);
        yield Ok(ExtractEvent::Complete(ExtractionReport { entries, cancelled }));
    })
}

/// Run [`extract_stream`] to completion and return its report.
pub async fn extract(session: &Session, request: &ExtractionRequest) -> Result<ExtractionReport> {
    let mut events = std::pin::pin!(extract_stream(session, request));
    while let Some(event) = events.next().await {
        if let ExtractEvent::Complete(report) = event? {
            return Ok(report);
        }
    }
    exn::bail!(ErrorKind::Cancelled)
}

async fn extract_entry(session: &Session, request: &ExtractionRequest, entry: Selected) -> EntryReport {
    let destination = request.output.target(&entry.path).ok();
    let outcome = match extract_file(session, request, &entry, destination.as_ref()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(
                path = %entry.path,
                content_id = %format!("{:08X}", entry.file.content_id),
                error = %*err,
                "extraction failed"
            );
            Outcome::Failed(Arc::new(err))
        },
    };
    EntryReport { ordinal: entry.ordinal, path: entry.path, destination, content_id: entry.file.content_id, outcome }
}

async fn extract_file(
    session: &Session,
    request: &ExtractionRequest,
    entry: &Selected,
    destination: Option<&PathBuf>,
) -> Result<Outcome> {
    let Some(destination) = destination else {
        exn::bail!(ErrorKind::Destination(PathBuf::from(&entry.path)));
    };
    let write_failed = || ErrorKind::Destination(destination.clone());
    if request.overwrite == OverwritePolicy::SkipExisting
        && request.output.exists(&entry.path).await.or_raise(write_failed)?
    {
        tracing::warn!(path = %entry.path, "skipped existing file");
        return Ok(Outcome::Skipped);
    }
    let data = session.read_file(&entry.file).await?;
    let bytes = data.len() as u64;
    request.output.write_atomic(&entry.path, data).await.or_raise(write_failed)?;
    tracing::info!(path = %entry.path, bytes, "extracted");
    Ok(Outcome::Written { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::source_for;
    use nusdec_storage::Resource;
    use nusdec_title::SharedKeys;
    use nusdec_title::error::Location;
    use nusdec_title::fixtures::{FixtureTitle, TitleBuilder, content_id};
    use rstest::rstest;

    const TITLE_ID: u64 = 0x0005_000E_1010_ED00;

    struct Harness {
        _dir: tempfile::TempDir,
        output: OutputDir,
        source: Arc<nusdec_storage::backend::MockSource>,
        session: Session,
    }

    async fn harness(title: &FixtureTitle) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputDir::new(dir.path().join("out")).unwrap();
        let source = source_for(title);
        let session = Session::open(source.clone(), &title.shared_keys(), None).await.unwrap();
        Harness { _dir: dir, output, source, session }
    }

    fn data_bin() -> Vec<u8> {
        (0..100u8).collect()
    }

    fn read(output: &OutputDir, path: &str) -> Option<Vec<u8>> {
        std::fs::read(output.root().join(path)).ok()
    }

    #[tokio::test]
    async fn test_single_file_written() {
        let title = TitleBuilder::new(TITLE_ID).file("data.bin", 1, data_bin()).build();
        let h = harness(&title).await;
        let request = ExtractionRequest::new(h.output.clone()).with_pattern(".*").unwrap();
        let request = request.with_overwrite(OverwritePolicy::Force);

        let report = extract(&h.session, &request).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.written(), 1);
        assert_eq!(report.bytes_written(), 100);
        let entry = &report.entries[0];
        assert_eq!(entry.path, "/data.bin");
        assert_eq!(entry.content_id, content_id(1));
        assert_eq!(entry.destination.as_deref(), Some(h.output.root().join("data.bin").as_path()));
        assert_eq!(read(&h.output, "data.bin").unwrap(), data_bin());
    }

    #[tokio::test]
    async fn test_unmatched_pattern_writes_nothing() {
        let title = TitleBuilder::new(TITLE_ID).file("data.bin", 1, data_bin()).build();
        let h = harness(&title).await;
        let request = ExtractionRequest::new(h.output.clone()).with_pattern(r"^missing\.bin$").unwrap();

        let report = extract(&h.session, &request).await.unwrap();
        assert!(report.entries.is_empty());
        assert_eq!(report.failed().count(), 0);
        assert!(read(&h.output, "data.bin").is_none());
        assert!(h.source.requests(Resource::Content(content_id(1))).await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_content_reports_integrity_failure() {
        let title = TitleBuilder::new(TITLE_ID).file("data.bin", 1, data_bin()).corrupt_digest(1).build();
        let h = harness(&title).await;
        let request = ExtractionRequest::new(h.output.clone());

        let report = extract(&h.session, &request).await.unwrap();
        assert_eq!(report.written(), 0);
        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].content_id, content_id(1));
        let Outcome::Failed(err) = &failed[0].outcome else { unreachable!() };
        assert_eq!(***err, ErrorKind::Integrity { content_id: content_id(1), location: Location::WholeContent });
        assert!(read(&h.output, "data.bin").is_none());
        assert_eq!(std::fs::read_dir(h.output.root()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_content_does_not_block_others() {
        let title = TitleBuilder::new(TITLE_ID)
            .file("a/bad.bin", 1, b"bad".to_vec())
            .file("b/good.bin", 2, b"good".to_vec())
            .file("c/also-good.bin", 3, b"also good".to_vec())
            .corrupt_digest(1)
            .build();
        let h = harness(&title).await;
        let report = extract(&h.session, &ExtractionRequest::new(h.output.clone())).await.unwrap();

        assert_eq!(report.written(), 2);
        assert_eq!(report.failed().map(|e| e.path.as_str()).collect::<Vec<_>>(), vec!["/a/bad.bin"]);
        assert_eq!(read(&h.output, "b/good.bin").unwrap(), b"good");
        assert_eq!(read(&h.output, "c/also-good.bin").unwrap(), b"also good");
    }

    #[rstest]
    #[case(OverwritePolicy::SkipExisting, b"old".as_slice())]
    #[case(OverwritePolicy::Force, b"new".as_slice())]
    #[tokio::test]
    async fn test_existing_files(#[case] overwrite: OverwritePolicy, #[case] expected: &[u8]) {
        let title = TitleBuilder::new(TITLE_ID).file("meta/meta.xml", 1, b"new".to_vec()).build();
        let h = harness(&title).await;
        std::fs::create_dir_all(h.output.root().join("meta")).unwrap();
        std::fs::write(h.output.root().join("meta/meta.xml"), b"old").unwrap();
        let request = ExtractionRequest::new(h.output.clone()).with_overwrite(overwrite);

        let report = extract(&h.session, &request).await.unwrap();
        assert_eq!(read(&h.output, "meta/meta.xml").unwrap(), expected);
        match overwrite {
            OverwritePolicy::SkipExisting => {
                assert_eq!(report.skipped(), 1);
                // Skipping never touches the content.
                assert!(h.source.requests(Resource::Content(content_id(1))).await.is_empty());
            },
            OverwritePolicy::Force => assert_eq!(report.written(), 1),
        }
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(16)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_report_in_walk_order(#[case] concurrency: usize) {
        let mut builder = TitleBuilder::new(TITLE_ID);
        for i in 0..12u16 {
            let path = format!("dir{}/file{i:02}.bin", i % 3);
            builder = builder.file(&path, 1 + i % 4, vec![i as u8; 40 + usize::from(i) * 7]);
        }
        let title = builder.build();
        let h = harness(&title).await;
        let request = ExtractionRequest::new(h.output.clone()).with_concurrency(concurrency);

        let report = extract(&h.session, &request).await.unwrap();
        let tree = h.session.tree().await.unwrap();
        let walk: Vec<&str> = tree.files().map(|(_, entry, _)| entry.path()).collect();
        let reported: Vec<&str> = report.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(reported, walk);
        assert!(report.entries.iter().enumerate().all(|(i, e)| e.ordinal == i));
        for (path, data) in &title.files {
            assert_eq!(&read(&h.output, &path[1..]).unwrap(), data);
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let title = TitleBuilder::new(TITLE_ID).file("a.bin", 1, b"a".to_vec()).file("b.bin", 1, b"b".to_vec()).build();
        let h = harness(&title).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = ExtractionRequest::new(h.output.clone()).with_cancellation(cancel);

        let report = extract(&h.session, &request).await.unwrap();
        assert!(report.cancelled);
        assert!(!report.is_complete());
        assert!(report.entries.is_empty());
        assert!(read(&h.output, "a.bin").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_midway_finishes_started_files() {
        let mut builder = TitleBuilder::new(TITLE_ID);
        for i in 0..6 {
            builder = builder.file(&format!("f{i}.bin"), 1, vec![i; 16]);
        }
        let title = builder.build();
        let h = harness(&title).await;
        let request = ExtractionRequest::new(h.output.clone()).with_concurrency(2);

        let mut events = std::pin::pin!(extract_stream(&h.session, &request));
        let mut extracted = 0;
        let mut report = None;
        while let Some(event) = events.next().await {
            match event.unwrap() {
                ExtractEvent::Extracted(_) => {
                    extracted += 1;
                    request.cancellation().cancel();
                },
                ExtractEvent::Complete(r) => report = Some(r),
                _ => {},
            }
        }
        let report = report.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.entries.len(), extracted);
        assert!(report.entries.len() < 6);
        // Everything reported as written is complete on disk.
        for entry in &report.entries {
            assert!(matches!(entry.outcome, Outcome::Written { bytes: 16 }));
            assert_eq!(std::fs::read(entry.destination.as_ref().unwrap()).unwrap().len(), 16);
        }
    }

    #[tokio::test]
    async fn test_event_order() {
        let title = TitleBuilder::new(TITLE_ID).file("x", 1, b"x".to_vec()).file("y", 2, b"y".to_vec()).build();
        let h = harness(&title).await;
        let request = ExtractionRequest::new(h.output.clone());
        let events: Vec<_> = extract_stream(&h.session, &request).map(|event| event.unwrap()).collect().await;

        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], ExtractEvent::Started));
        assert!(matches!(events[1], ExtractEvent::DiscoveryComplete(2)));
        assert!(events[2..4].iter().all(|e| matches!(e, ExtractEvent::Extracted(_))));
        assert!(matches!(&events[4], ExtractEvent::Complete(report) if report.written() == 2));
    }

    #[tokio::test]
    async fn test_tree_failure_ends_stream() {
        let title = TitleBuilder::new(TITLE_ID).file("x", 1, b"x".to_vec()).corrupt_digest(0).build();
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(source_for(&title), &title.shared_keys(), None).await.unwrap();
        let request = ExtractionRequest::new(OutputDir::new(dir.path()).unwrap());

        let events: Vec<_> = extract_stream(&session, &request).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(ExtractEvent::Started)));
        let err = events.into_iter().nth(1).unwrap().err().unwrap();
        assert!(matches!(*err, ErrorKind::Integrity { content_id: id, .. } if id == content_id(0)));
        assert!(extract(&session, &request).await.is_err());
    }

    #[tokio::test]
    async fn test_hashed_file_fetches_only_its_blocks() {
        let title = TitleBuilder::new(TITLE_ID)
            .file("content/first.bin", 1, vec![1u8; 0x10000])
            .file("content/second.bin", 1, vec![2u8; 0x100])
            .hashed(1)
            .build();
        let h = harness(&title).await;
        let request = ExtractionRequest::new(h.output.clone()).with_pattern("content/second\\.bin").unwrap();

        let report = extract(&h.session, &request).await.unwrap();
        assert_eq!(report.written(), 1);
        assert_eq!(read(&h.output, "content/second.bin").unwrap(), vec![2u8; 0x100]);
        // 0x10000 lies in the second 0xFC00-byte data block.
        assert_eq!(h.source.requests(Resource::Content(content_id(1))).await, vec![0x10000..0x20000]);
        assert_eq!(h.source.requests(Resource::HashTree(content_id(1))).await.len(), 1);
    }

    #[tokio::test]
    async fn test_contents_fetched_by_id_and_decrypted_by_index() {
        let title = TitleBuilder::new(TITLE_ID)
            .file("code/app.rpx", 1, vec![0xA1; 0x300])
            .file("content/big.bin", 2, (0..0x14000u32).map(|i| (i % 253) as u8).collect::<Vec<_>>())
            .file("meta/meta.xml", 3, b"<menu/>".to_vec())
            .hashed(2)
            .build();
        let h = harness(&title).await;

        let report = extract(&h.session, &ExtractionRequest::new(h.output.clone()).with_concurrency(3)).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.written(), 3);
        for (path, data) in &title.files {
            assert_eq!(&read(&h.output, &path[1..]).unwrap(), data);
        }
        let ids: Vec<u32> = report.entries.iter().map(|e| e.content_id).collect();
        assert_eq!(ids, vec![content_id(1), content_id(2), content_id(3)]);
        for index in 1..=3u16 {
            assert!(!h.source.requests(Resource::Content(content_id(index))).await.is_empty());
            assert!(h.source.requests(Resource::Content(u32::from(index))).await.is_empty());
        }
        assert_eq!(h.source.requests(Resource::HashTree(content_id(2))).await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_keys_and_no_title_key() {
        let title = TitleBuilder::new(TITLE_ID).file("x", 1, b"x".to_vec()).build();
        let err = Session::open(source_for(&title), &SharedKeys::new(), None).await.err().unwrap();
        assert_eq!(*err, ErrorKind::KeyDerivation);
    }

    #[rstest]
    #[case(".*", "/code/app.xml", true)]
    #[case("/code/.*", "/code/app.xml", true)]
    #[case("code/.*", "/code/app.xml", true)]
    #[case(r".*\.xml", "/meta/meta.xml", true)]
    #[case("code", "/code/app.xml", false)]
    #[case("app", "/code/app.xml", false)]
    #[case(r"^missing\.bin$", "/data.bin", false)]
    #[case("/CODE/.*", "/code/app.xml", false)]
    #[case("(?i)/CODE/.*", "/code/app.xml", true)]
    #[case("a|b", "/ab", false)]
    #[case("a|b", "/a", true)]
    fn test_pattern_matches_whole_path(#[case] pattern: &str, #[case] path: &str, #[case] expected: bool) {
        let dir = tempfile::tempdir().unwrap();
        let request = ExtractionRequest::new(OutputDir::new(dir.path()).unwrap()).with_pattern(pattern).unwrap();
        assert_eq!(request.matches(path), expected);
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExtractionRequest::new(OutputDir::new(dir.path()).unwrap()).with_pattern("(unclosed").unwrap_err();
        assert_eq!(*err, ErrorKind::Pattern("(unclosed".to_string()));
    }
}
