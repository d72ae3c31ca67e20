//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use reqwest::header::{HeaderName, HeaderValue};
use resumable_core::ChecksumAlgorithm;
use url::Url;

/// Resumable, integrity-checked file downloader.
///
/// Interrupted downloads continue from the last verified byte on the next
/// run. With `--check` and `--sum` the finished file is verified against an
/// expected checksum.
#[derive(Parser, Debug)]
#[command(name = "rdl")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download, processed in order
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Destination file for the URL at the same position (default: derived from the URL)
    #[arg(short = 'n', long = "name", value_name = "NAME")]
    pub names: Vec<PathBuf>,

    /// Verification algorithm (SHA224, SHA256, SHA384, SHA512, SHA512_224, SHA512_256, SHA3_224, SHA3_256, SHA3_384, SHA3_512)
    #[arg(short = 'c', long, value_name = "ALGO")]
    pub check: Option<ChecksumAlgorithm>,

    /// Expected hex checksum for the URL at the same position
    #[arg(short = 's', long = "sum", value_name = "HEX", value_parser = parse_hex_sum)]
    pub sums: Vec<HexSum>,

    /// Extra request header, repeatable
    #[arg(short = 'H', long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
    pub headers: Vec<(HeaderName, HeaderValue)>,

    /// Store resume metadata as human-readable JSON
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Bytes written between two metadata checkpoints
    #[arg(long, value_name = "BYTES", value_parser = clap::value_parser!(u64).range(1..))]
    pub sync_threshold: Option<u64>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Decoded `--sum` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexSum(pub Vec<u8>);

fn parse_hex_sum(raw: &str) -> Result<HexSum, String> {
    hex::decode(raw.trim())
        .map(HexSum)
        .map_err(|e| format!("invalid hex checksum '{raw}': {e}"))
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got '{raw}'"));
    };
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| format!("invalid header name '{}': {e}", name.trim()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| format!("invalid value for header '{name}': {e}"))?;
    Ok((name, value))
}

/// File name for a URL without an explicit `--name`.
///
/// Uses the last non-empty path segment, falling back to the host.
#[must_use]
pub fn derive_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let from_path = parsed
        .path_segments()
        .and_then(|segments| {
            segments
                .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
                .next_back()
        })
        .map(str::to_string);
    from_path.or_else(|| parsed.host_str().map(str::to_string))
}
