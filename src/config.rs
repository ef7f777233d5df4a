//! Configuration module

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::asset_writer::AssetNaming;
use crate::retry::RetryPolicy;
use crate::rewriter::ReplaceMode;
use crate::transformer::OutputFormat;

/// Aspect-ratio heuristic used to pick output dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingConfig {
    /// Below this width/height ratio an image is treated as a profile shot.
    pub aspect_cutoff: f64,
    pub shrink_factor: f64,
    pub min_profile_width: u32,
    pub min_profile_height: u32,
    pub min_wide_width: u32,
    pub min_wide_height: u32,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            aspect_cutoff: 1.7777,
            shrink_factor: 0.125,
            min_profile_width: 720,
            min_profile_height: 800,
            min_wide_width: 1280,
            min_wide_height: 720,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the generated site.
    pub root: PathBuf,
    /// Where localized assets are written.
    pub output_dir: PathBuf,
    /// Prefix used for rewritten references, e.g. `/remote`.
    pub public_prefix: String,
    /// Where the audit artifacts go.
    pub debug_dir: PathBuf,
    pub markup_extensions: Vec<String>,
    /// Hosts known to emit `&amp;` inside URLs.
    pub cleanup_hosts: Vec<String>,
    pub sizing: SizingConfig,
    pub output_format: OutputFormat,
    pub quality: u8,
    pub fetch_timeout: Duration,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub naming: AssetNaming,
    pub replace_mode: ReplaceMode,
}

impl Default for Config {
    fn default() -> Self {
        let root = PathBuf::from("dist/client");
        Self {
            output_dir: root.join("remote"),
            root,
            public_prefix: "/remote".to_string(),
            debug_dir: PathBuf::from("debug"),
            markup_extensions: vec!["html".to_string()],
            cleanup_hosts: vec!["cdninstagram".to_string(), "amazonaws".to_string()],
            sizing: SizingConfig::default(),
            output_format: OutputFormat::WebP,
            quality: 80,
            fetch_timeout: Duration::from_secs(30),
            concurrency: 8,
            retry: RetryPolicy::default(),
            naming: AssetNaming::ContentAddressed,
            replace_mode: ReplaceMode::All,
        }
    }
}

impl Config {
    /// Build the configuration from `REMOTE_ASSETS_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let root = env::var("REMOTE_ASSETS_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.root);
        let output_dir = env::var("REMOTE_ASSETS_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| root.join("remote"));

        let sizing = SizingConfig {
            aspect_cutoff: parse_var("REMOTE_ASSETS_ASPECT_CUTOFF", defaults.sizing.aspect_cutoff)?,
            shrink_factor: parse_var("REMOTE_ASSETS_SHRINK", defaults.sizing.shrink_factor)?,
            min_profile_width: parse_var(
                "REMOTE_ASSETS_MIN_PROFILE_WIDTH",
                defaults.sizing.min_profile_width,
            )?,
            min_profile_height: parse_var(
                "REMOTE_ASSETS_MIN_PROFILE_HEIGHT",
                defaults.sizing.min_profile_height,
            )?,
            min_wide_width: parse_var("REMOTE_ASSETS_MIN_WIDE_WIDTH", defaults.sizing.min_wide_width)?,
            min_wide_height: parse_var(
                "REMOTE_ASSETS_MIN_WIDE_HEIGHT",
                defaults.sizing.min_wide_height,
            )?,
        };
        if sizing.aspect_cutoff <= 0.0 || sizing.shrink_factor <= 0.0 {
            return Err(anyhow!("aspect cutoff and shrink factor must be positive"));
        }

        let retry = RetryPolicy {
            max_attempts: parse_var("REMOTE_ASSETS_MAX_ATTEMPTS", defaults.retry.max_attempts)?.max(1),
            ..defaults.retry
        };

        let concurrency: usize = parse_var("REMOTE_ASSETS_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(anyhow!("REMOTE_ASSETS_CONCURRENCY must be at least 1"));
        }

        Ok(Self {
            root,
            output_dir,
            public_prefix: env::var("REMOTE_ASSETS_PUBLIC_PREFIX").unwrap_or(defaults.public_prefix),
            debug_dir: env::var("REMOTE_ASSETS_DEBUG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.debug_dir),
            markup_extensions: list_var("REMOTE_ASSETS_EXTENSIONS")
                .unwrap_or(defaults.markup_extensions),
            cleanup_hosts: list_var("REMOTE_ASSETS_CLEANUP_HOSTS").unwrap_or(defaults.cleanup_hosts),
            sizing,
            output_format: parse_var("REMOTE_ASSETS_FORMAT", defaults.output_format)?,
            quality: parse_var("REMOTE_ASSETS_QUALITY", defaults.quality)?.clamp(1, 100),
            fetch_timeout: Duration::from_secs(parse_var(
                "REMOTE_ASSETS_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            concurrency,
            retry,
            naming: parse_var("REMOTE_ASSETS_NAMING", defaults.naming)?,
            replace_mode: parse_var("REMOTE_ASSETS_REPLACE", defaults.replace_mode)?,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn list_var(name: &str) -> Option<Vec<String>> {
    let raw = env::var(name).ok()?;
    Some(split_list(&raw))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
