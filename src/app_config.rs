//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use resumable_core::ChecksumAlgorithm;

/// TOML-like file configuration for `rdl` defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Bytes written between two metadata checkpoints.
    pub sync_threshold: Option<u64>,
    /// Store side-car metadata as JSON instead of the binary encoding.
    pub json_metadata: Option<bool>,
    /// Default verification algorithm.
    pub checksum: Option<ChecksumAlgorithm>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if self.sync_threshold == Some(0) {
            bail!("Invalid config value for `sync_threshold`: 0. Expected at least 1 byte");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/rdl/config.toml`
/// 2. `$HOME/.config/rdl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("rdl").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("rdl")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "sync_threshold" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `sync_threshold` value on line {line_no}")
                })?;
                cfg.sync_threshold = Some(parsed);
            }
            "json_metadata" => {
                let parsed = parse_boolean(value).with_context(|| {
                    format!("Invalid `json_metadata` value on line {line_no}")
                })?;
                cfg.json_metadata = Some(parsed);
            }
            "checksum" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `checksum` value on line {line_no}"))?;
                let algorithm = parsed
                    .parse::<ChecksumAlgorithm>()
                    .with_context(|| format!("Invalid `checksum` value on line {line_no}"))?;
                cfg.checksum = Some(algorithm);
            }
            "connect_timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `connect_timeout_secs` value on line {line_no}")
                })?;
                cfg.connect_timeout_secs = Some(parsed);
            }
            "read_timeout_secs" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `read_timeout_secs` value on line {line_no}")
                })?;
                cfg.read_timeout_secs = Some(parsed);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
sync_threshold = 1048576
json_metadata = true
checksum = "sha3-256"
connect_timeout_secs = 15
read_timeout_secs = 120
"#,
        )
        .expect("full config should parse");
        assert_eq!(
            cfg,
            FileConfig {
                sync_threshold: Some(1_048_576),
                json_metadata: Some(true),
                checksum: Some(ChecksumAlgorithm::Sha3_256),
                connect_timeout_secs: Some(15),
                read_timeout_secs: Some(120),
            }
        );
    }

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str("json_metadata = false").expect("partial config should parse");
        assert_eq!(cfg.json_metadata, Some(false));
        assert!(cfg.sync_threshold.is_none());
        assert!(cfg.checksum.is_none());
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
sync_threshold = 4096 # small checkpoints
checksum = "SHA512" # matches the mirror's SHA512SUMS
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.sync_threshold, Some(4096));
        assert_eq!(cfg.checksum, Some(ChecksumAlgorithm::Sha512));
    }

    #[test]
    fn test_parse_config_rejects_zero_sync_threshold() {
        let err = parse_config_str("sync_threshold = 0").expect_err("zero threshold expected");
        assert!(err.to_string().contains("sync_threshold"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_checksum() {
        let err = parse_config_str(r#"checksum = "md5""#).expect_err("unknown checksum expected");
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_checksum() {
        let err = parse_config_str("checksum = SHA256").expect_err("quoted string expected");
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("sync_threshold = 4 trailing")
            .expect_err("expected trailing token error");
        assert!(err.to_string().contains("sync_threshold"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout_value() {
        let err =
            parse_config_str("connect_timeout_secs = 0").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("connect_timeout_secs"));

        let err =
            parse_config_str("read_timeout_secs = 3601").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("read_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_boolean() {
        let err = parse_config_str("json_metadata = yes").expect_err("invalid boolean expected");
        assert!(err.to_string().contains("json_metadata"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("sync_threshold 10").expect_err("syntax error expected");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_load_file_config_reports_path() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "bogus = 1").expect("write config");

        let err = load_file_config(&path).expect_err("invalid file expected");
        assert!(format!("{err:#}").contains("config.toml"));
    }
}
