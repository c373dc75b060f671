mod cli;
mod error;

use crate::cli::Args;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use futures::StreamExt;
use nusdec_config::Config;
use nusdec_extract::{ExtractEvent, ExtractionReport, ExtractionRequest, Outcome, OverwritePolicy, Session};
use nusdec_storage::backend::LocalSource;
use nusdec_storage::{OutputDir, SourceHandle};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())))
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(report) => summarize(&report),
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<ExtractionReport> {
    let mut config = Config::load(args.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    args.apply(&mut config);
    config.validate().or_raise(|| ErrorKind::Config)?;
    let keys = config.keys.shared_keys().or_raise(|| ErrorKind::Config)?;
    let title_key = config.keys.title_key().or_raise(|| ErrorKind::Config)?;
    if keys.is_empty() && title_key.is_none() {
        tracing::warn!("no common key or title key configured; the ticket cannot be unwrapped");
    }

    let source = open_source(&config, args.title_id, args.version)?;
    let session = Session::open(source, &keys, title_key).await.or_raise(|| ErrorKind::Session)?;
    if let Some(version) = args.version
        && session.manifest().title_version != version
    {
        tracing::warn!(requested = version, found = session.manifest().title_version, "title version differs");
    }

    let root = std::path::absolute(&config.extract.output)
        .or_raise(|| ErrorKind::Output)?
        .join(format!("{:016X}", args.title_id));
    let output = OutputDir::new(&root).or_raise(|| ErrorKind::Output)?;
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted; finishing files already started");
                cancel.cancel();
            }
        }
    });
    let overwrite = match config.extract.overwrite {
        true => OverwritePolicy::Force,
        false => OverwritePolicy::SkipExisting,
    };
    let request = ExtractionRequest::new(output)
        .with_pattern(&config.extract.pattern)
        .or_raise(|| ErrorKind::Config)?
        .with_overwrite(overwrite)
        .with_concurrency(config.concurrency())
        .with_cancellation(cancel);

    let mut events = std::pin::pin!(nusdec_extract::extract_stream(&session, &request));
    let mut total = 0;
    let mut done = 0;
    while let Some(event) = events.next().await {
        match event.or_raise(|| ErrorKind::Extraction)? {
            ExtractEvent::Started => tracing::info!(output = %root.display(), "extracting"),
            ExtractEvent::DiscoveryComplete(count) => total = count,
            ExtractEvent::Extracted(entry) => {
                done += 1;
                tracing::debug!(path = %entry.path, "{done}/{total}");
            },
            ExtractEvent::Complete(report) => return Ok(report),
        }
    }
    exn::bail!(ErrorKind::Extraction)
}

fn open_source(config: &Config, title_id: u64, version: Option<u16>) -> Result<SourceHandle> {
    if let Some(directory) = &config.source.directory {
        let source = LocalSource::new("local", directory).or_raise(|| ErrorKind::Source)?;
        return Ok(Arc::new(source));
    }
    remote_source(config, title_id, version)
}

#[cfg(feature = "remote")]
fn remote_source(config: &Config, title_id: u64, version: Option<u16>) -> Result<SourceHandle> {
    let source = nusdec_storage::backend::RemoteSource::new("remote", &config.source.base_url, title_id, version)
        .or_raise(|| ErrorKind::Source)?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "remote"))]
fn remote_source(_config: &Config, _title_id: u64, _version: Option<u16>) -> Result<SourceHandle> {
    tracing::error!("built without the `remote` feature; pass --dir to read a local copy");
    exn::bail!(ErrorKind::Source)
}

fn summarize(report: &ExtractionReport) -> ExitCode {
    for entry in report.failed() {
        if let Outcome::Failed(err) = &entry.outcome {
            eprintln!("failed: {} ({:08X}): {err:?}", entry.path, entry.content_id);
        }
    }
    println!(
        "{} written ({} bytes), {} skipped, {} failed{}",
        report.written(),
        report.bytes_written(),
        report.skipped(),
        report.failed().count(),
        if report.cancelled { ", cancelled" } else { "" },
    );
    match report.is_complete() {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    }
}
