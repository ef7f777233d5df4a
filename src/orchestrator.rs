//! Orchestrator Module
//! Walks the site, localizes every remote image reference, and rewrites markup

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use walkdir::WalkDir;

use crate::asset_writer::AssetWriter;
use crate::audit::AuditSink;
use crate::config::Config;
use crate::error::LocalizeError;
use crate::extractor::extract;
use crate::fetcher::{fetch_with_retry, sniff, Fetch};
use crate::normalizer::{dedupe, RemoteRef};
use crate::rewriter::MarkupFile;
use crate::transformer::transform;

/// Counts reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files_scanned: usize,
    pub files_rewritten: usize,
    pub localized: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Default)]
struct FileOutcome {
    rewritten: bool,
    localized: usize,
    failures: Vec<&'static str>,
}

/// List every markup file under `root` whose extension is in `extensions`.
pub fn discover_files(root: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("markup root {} is not a directory", root.display()),
        ));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Orchestrator: skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    Ok(files)
}

/// Drives one localization run.
pub struct Localizer {
    config: Config,
    fetcher: Arc<dyn Fetch>,
    writer: AssetWriter,
    audit: Arc<AuditSink>,
    permits: Semaphore,
    /// URL -> local filename, one slot per URL so concurrent files share a single fetch.
    assets: Mutex<HashMap<String, Arc<Mutex<Option<String>>>>>,
}

impl Localizer {
    pub fn new(config: Config, fetcher: Arc<dyn Fetch>) -> Self {
        let writer = AssetWriter::new(
            config.output_dir.clone(),
            config.naming,
            config.output_format.extension(),
        );
        Self {
            audit: Arc::new(AuditSink::new(config.debug_dir.clone())),
            permits: Semaphore::new(config.concurrency.max(1)),
            assets: Mutex::new(HashMap::new()),
            writer,
            fetcher,
            config,
        }
    }

    /// Stop starting new fetches. In-flight work finishes and is still
    /// written back; references not yet fetched are recorded as failures.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    #[cfg(test)]
    pub fn audit(&self) -> Arc<AuditSink> {
        self.audit.clone()
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let root = self.config.root.clone();
        let extensions = self.config.markup_extensions.clone();
        let files = tokio::task::spawn_blocking(move || discover_files(&root, &extensions))
            .await
            .context("file discovery task failed")?
            .with_context(|| format!("failed to enumerate markup under {}", self.config.root.display()))?;

        tracing::info!(
            "Orchestrator: {} markup files under {}",
            files.len(),
            self.config.root.display()
        );

        let outcomes: Vec<FileOutcome> = stream::iter(files)
            .map(|path| self.process_file(path))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut summary = RunSummary {
            files_scanned: outcomes.len(),
            ..RunSummary::default()
        };
        for outcome in outcomes {
            summary.localized += outcome.localized;
            summary.failed += outcome.failures.len();
            if outcome.rewritten {
                summary.files_rewritten += 1;
            }
            for kind in outcome.failures {
                *summary.failures_by_kind.entry(kind).or_insert(0) += 1;
            }
        }

        if let Err(e) = self.audit.persist().await {
            tracing::warn!("Orchestrator: failed to write audit artifacts: {}", e);
        }

        tracing::info!(
            "Orchestrator: localized {} assets ({} failed), rewrote {} of {} files",
            summary.localized,
            summary.failed,
            summary.files_rewritten,
            summary.files_scanned
        );
        Ok(summary)
    }

    async fn process_file(&self, path: PathBuf) -> FileOutcome {
        let mut outcome = FileOutcome::default();

        let file = match MarkupFile::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Orchestrator: cannot read {}: {}", path.display(), e);
                return outcome;
            }
        };
        self.audit.register_file(&path).await;

        let refs = dedupe(extract(file.text()), &self.config.cleanup_hosts);
        if refs.is_empty() {
            return outcome;
        }
        tracing::debug!("Orchestrator: {} remote images in {}", refs.len(), path.display());

        let file = Mutex::new(file);
        let results = futures::future::join_all(refs.iter().map(|r| self.process_ref(&path, &file, r))).await;

        for result in results {
            match result {
                Ok(()) => outcome.localized += 1,
                Err(kind) => outcome.failures.push(kind),
            }
        }

        let file = file.into_inner();
        match file.persist().await {
            Ok(written) => outcome.rewritten = written,
            Err(e) => tracing::warn!("Orchestrator: failed to rewrite {}: {}", path.display(), e),
        }
        outcome
    }

    /// Localize one URL and apply it to the file. Errors stay at this level.
    async fn process_ref(
        &self,
        path: &Path,
        file: &Mutex<MarkupFile>,
        remote: &RemoteRef,
    ) -> std::result::Result<(), &'static str> {
        self.audit.record_url(&remote.url).await;

        let result = async {
            let filename = self.localize(&remote.url).await?;
            self.apply(file, remote, &filename).await?;
            Ok::<_, LocalizeError>(filename)
        }
        .await;

        match result {
            Ok(filename) => {
                if let Err(e) = self.audit.record_asset(path, &filename, &remote.url).await {
                    tracing::warn!("Orchestrator: failed to write audit artifacts: {}", e);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Orchestrator: failed to localize {} in {}: {}", remote.url, path.display(), e);
                if let Err(io) = self.audit.record_failure(path, &remote.url, &e.to_string()).await {
                    tracing::warn!("Orchestrator: failed to write audit artifacts: {}", io);
                }
                Err(e.kind())
            }
        }
    }

    /// Swap every spelling of `remote` for the local path of `filename`.
    async fn apply(
        &self,
        file: &Mutex<MarkupFile>,
        remote: &RemoteRef,
        filename: &str,
    ) -> std::result::Result<(), LocalizeError> {
        let local = format!("{}/{}", self.config.public_prefix.trim_end_matches('/'), filename);
        let mut file = file.lock().await;
        let replaced: usize = remote
            .spellings
            .iter()
            .map(|spelling| file.replace(spelling, &local, self.config.replace_mode))
            .sum();
        tracing::debug!("Orchestrator: {} -> {} ({} occurrences)", remote.url, local, replaced);

        if replaced == 0 {
            return Err(LocalizeError::NotRewritten);
        }
        Ok(())
    }

    /// Fetch, classify, transform and write one URL, or reuse an earlier result.
    async fn localize(&self, url: &str) -> std::result::Result<String, LocalizeError> {
        let entry = {
            let mut assets = self.assets.lock().await;
            assets.entry(url.to_string()).or_default().clone()
        };
        let mut slot = entry.lock().await;
        if let Some(filename) = &*slot {
            return Ok(filename.clone());
        }

        if let Some(filename) = self.writer.existing(url).await {
            tracing::debug!("Orchestrator: reusing {} for {}", filename, url);
            *slot = Some(filename.clone());
            return Ok(filename);
        }

        let _permit = self.permits.acquire().await.map_err(|_| LocalizeError::Shutdown)?;

        let bytes = fetch_with_retry(
            self.fetcher.as_ref(),
            url,
            self.config.fetch_timeout,
            &self.config.retry,
        )
        .await?;
        let format = sniff(&bytes).ok_or(LocalizeError::UnknownType)?;

        let sizing = self.config.sizing;
        let output = self.config.output_format;
        let quality = self.config.quality;
        let encoded = tokio::task::spawn_blocking(move || transform(&bytes, format, &sizing, output, quality))
            .await
            .map_err(|e| LocalizeError::Transform(format!("transform task failed: {}", e)))??;

        let filename = self.writer.write(url, &encoded.bytes).await?;
        tracing::info!(
            "Orchestrator: localized {} as {} ({}x{} -> {}x{})",
            url,
            filename,
            encoded.source_width,
            encoded.source_height,
            encoded.width,
            encoded.height
        );

        *slot = Some(filename.clone());
        Ok(filename)
    }
}
