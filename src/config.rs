//! Runtime configuration, read from the Lambda environment.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Worker pool size used when `FANOUT_WORKERS` is unset.
pub const DEFAULT_WORKERS: usize = 4;

/// Configuration for creating an S3 client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Optional custom endpoint URL (LocalStack, MinIO)
    pub endpoint_url: Option<String>,
    /// Whether to use path-style addressing (required for some S3-compatible services)
    pub force_path_style: bool,
    /// Optional region override
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Number of entries read and uploaded concurrently
    pub workers: usize,
    /// Directory under which each run creates its own temp dir
    pub scratch_dir: PathBuf,
    pub storage: StorageConfig,
    /// Human-readable logs instead of JSON
    pub pretty_print: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            workers: DEFAULT_WORKERS,
            scratch_dir: env::temp_dir(),
            storage: StorageConfig::default(),
            pretty_print: false,
        }
    }
}

impl ExtractorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(get_env_var)
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let workers = match lookup("FANOUT_WORKERS") {
            None => DEFAULT_WORKERS,
            Some(raw) => parse_workers(&raw)?,
        };

        let scratch_dir = lookup("SCRATCH_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);

        let storage = StorageConfig {
            endpoint_url: lookup("S3_ENDPOINT_URL").filter(|url| !url.is_empty()),
            force_path_style: parse_bool(lookup("S3_FORCE_PATH_STYLE")),
            region: lookup("AWS_REGION").filter(|region| !region.is_empty()),
        };

        Ok(ExtractorConfig {
            workers,
            scratch_dir,
            storage,
            pretty_print: pretty_print_from(&lookup),
        })
    }
}

/// Log format flag, readable before the subscriber is installed.
pub fn pretty_print_from_env() -> bool {
    pretty_print_from(|key| env::var(key).ok())
}

fn pretty_print_from(lookup: impl Fn(&str) -> Option<String>) -> bool {
    parse_bool(lookup("PRETTY_PRINT"))
}

fn parse_workers(raw: &str) -> Result<usize> {
    let workers: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("FANOUT_WORKERS must be a positive integer, got {raw:?}"))?;
    if workers == 0 {
        return Err(anyhow!("FANOUT_WORKERS must be at least 1"));
    }
    Ok(workers)
}

fn parse_bool(raw: Option<String>) -> bool {
    raw.is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Get an environment variable, encoding found or missing as Option.
pub fn get_env_var(key: &str) -> Option<String> {
    let var = env::var(key).ok();

    if let Some(ref value) = var {
        debug!("env var {key}: {value}");
    } else {
        debug!("env var {key} requested but not found");
    }

    var
}
