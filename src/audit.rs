//! Audit Sink Module
//! Accumulates file -> asset mappings and every URL seen, flushed after each asset

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const MAPPING_FILE: &str = "image.json";
const URLS_FILE: &str = "imageUrls.json";
const FAILURES_FILE: &str = "imageFailures.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalizedAsset {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAsset {
    pub file: String,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone)]
pub struct AuditRecord {
    pub files: BTreeMap<String, Vec<LocalizedAsset>>,
    pub urls: Vec<String>,
    pub failures: Vec<FailedAsset>,
}

/// Shared, lock-guarded audit state. Writes to the debug directory happen
/// while the lock is held, so concurrent tasks never interleave artifacts.
pub struct AuditSink {
    dir: PathBuf,
    state: Mutex<AuditRecord>,
}

impl AuditSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state: Mutex::new(AuditRecord::default()),
        }
    }

    pub async fn register_file(&self, file: &Path) {
        let mut state = self.state.lock().await;
        state.files.entry(key(file)).or_default();
    }

    pub async fn record_url(&self, url: &str) {
        self.state.lock().await.urls.push(url.to_string());
    }

    pub async fn record_asset(&self, file: &Path, filename: &str, url: &str) -> std::io::Result<()> {
        let mut state = self.state.lock().await;
        state.files.entry(key(file)).or_default().push(LocalizedAsset {
            filename: filename.to_string(),
            url: url.to_string(),
        });
        self.flush(&state).await
    }

    pub async fn record_failure(&self, file: &Path, url: &str, reason: &str) -> std::io::Result<()> {
        let mut state = self.state.lock().await;
        state.failures.push(FailedAsset {
            file: key(file),
            url: url.to_string(),
            reason: reason.to_string(),
        });
        self.flush(&state).await
    }

    /// Write all artifacts with the current state.
    pub async fn persist(&self) -> std::io::Result<()> {
        let state = self.state.lock().await;
        self.flush(&state).await
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> AuditRecord {
        self.state.lock().await.clone()
    }

    async fn flush(&self, state: &AuditRecord) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        write_json(&self.dir.join(MAPPING_FILE), &state.files).await?;
        write_json(&self.dir.join(URLS_FILE), &state.urls).await?;
        write_json(&self.dir.join(FAILURES_FILE), &state.failures).await
    }
}

fn key(file: &Path) -> String {
    file.display().to_string()
}

/// Serialize to a sibling temp file, then rename over the target.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}
