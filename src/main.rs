//! CLI entry point for the resumable downloader.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use reqwest::header::HeaderMap;
use resumable_core::download::DEFAULT_SYNC_THRESHOLD;
use resumable_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use resumable_core::{BinaryCodec, HttpClient, JsonCodec, MetadataCodec, Worker, WorkerOptions};
use tracing::{debug, error, info};

mod app_config;
mod cli;
mod output;

use app_config::FileConfig;
use cli::Args;
use output::ProgressNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout belongs to the progress line
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_default_file_config()?;
    if let Some(path) = loaded.path.as_deref() {
        debug!(path = %path.display(), loaded = loaded.config.is_some(), "config file");
    }
    let file_config = loaded.config.unwrap_or_default();

    run(&args, &file_config).await
}

async fn run(args: &Args, file_config: &FileConfig) -> Result<()> {
    let check = args.check.or(file_config.checksum);
    if check.is_none() && !args.sums.is_empty() {
        bail!("--sum requires a verification algorithm (--check or `checksum` in the config file)");
    }

    let connect = file_config
        .connect_timeout_secs
        .unwrap_or(CONNECT_TIMEOUT_SECS);
    let read = file_config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS);
    let client = HttpClient::with_timeouts(Duration::from_secs(connect), Duration::from_secs(read))
        .context("Failed to build HTTP client")?;

    let codec: Arc<dyn MetadataCodec> = if args.json || file_config.json_metadata == Some(true) {
        Arc::new(JsonCodec)
    } else {
        Arc::new(BinaryCodec)
    };
    let sync_threshold = args
        .sync_threshold
        .or(file_config.sync_threshold)
        .unwrap_or(DEFAULT_SYNC_THRESHOLD);

    let mut headers = HeaderMap::new();
    for (name, value) in &args.headers {
        headers.append(name.clone(), value.clone());
    }

    let show_progress = !args.quiet && io::stdout().is_terminal();

    for (index, url) in args.urls.iter().enumerate() {
        let destination = destination_for(args, index, url)?;
        let expected = args
            .sums
            .get(index)
            .map(|sum| sum.0.clone())
            .unwrap_or_default();
        info!(url = %url, destination = %destination.display(), "get");

        let notifier = Arc::new(ProgressNotifier::new(
            destination.display().to_string(),
            show_progress,
        ));
        let options = WorkerOptions::builder()
            .client(client.clone())
            .headers(headers.clone())
            .notifier(notifier)
            .codec(Arc::clone(&codec))
            .sync_threshold(sync_threshold)
            .build();

        let mut worker = Worker::new(url.as_str(), destination, Arc::new(options));
        if let Some(algorithm) = check {
            worker.set_verification(Some(algorithm.checksum()), expected)?;
        }

        match worker.run().await {
            Ok(status) => info!(url = %url, %status, "done"),
            Err(e) => {
                error!(url = %url, error = %e, "download failed");
                return Err(e).with_context(|| format!("Failed to download '{url}'"));
            }
        }
    }
    Ok(())
}

fn destination_for(args: &Args, index: usize, url: &str) -> Result<PathBuf> {
    if let Some(name) = args.names.get(index) {
        return Ok(name.clone());
    }
    cli::derive_file_name(url)
        .map(PathBuf::from)
        .with_context(|| format!("Cannot derive a file name from '{url}'; pass --name"))
}
