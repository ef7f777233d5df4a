//! Asset Writer Module
//! Names localized assets and persists them under the output directory

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;

use crate::error::LocalizeError;

const TOKEN_LEN: usize = 12;

/// How the `<token>` part of `<token>.remote.<ext>` is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetNaming {
    /// Hash of the normalized URL. Stable across runs.
    ContentAddressed,
    /// Fresh random token per asset.
    Random,
}

impl AssetNaming {
    pub fn token_for(&self, url: &str) -> String {
        match self {
            AssetNaming::ContentAddressed => {
                let hash = blake3::hash(url.as_bytes()).to_hex();
                hash.as_str()[..TOKEN_LEN].to_string()
            }
            AssetNaming::Random => uuid::Uuid::new_v4().simple().to_string()[..TOKEN_LEN].to_string(),
        }
    }
}

impl FromStr for AssetNaming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "content" | "hash" => Ok(AssetNaming::ContentAddressed),
            "random" => Ok(AssetNaming::Random),
            other => Err(format!("unknown naming scheme '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssetWriter {
    dir: PathBuf,
    naming: AssetNaming,
    extension: &'static str,
}

impl AssetWriter {
    pub fn new(dir: impl Into<PathBuf>, naming: AssetNaming, extension: &'static str) -> Self {
        Self {
            dir: dir.into(),
            naming,
            extension,
        }
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn filename(&self, token: &str) -> String {
        format!("{}.remote.{}", token, self.extension)
    }

    /// Filename of an asset already on disk for `url`, if names are stable.
    pub async fn existing(&self, url: &str) -> Option<String> {
        if self.naming != AssetNaming::ContentAddressed {
            return None;
        }
        let filename = self.filename(&self.naming.token_for(url));
        match tokio::fs::try_exists(self.dir.join(&filename)).await {
            Ok(true) => Some(filename),
            _ => None,
        }
    }

    /// Write `bytes` as a new asset for `url` and return its filename.
    ///
    /// Never overwrites: a content-addressed name that already exists is
    /// reused, any other collision is an error. Bytes go to a temporary
    /// sibling first, so the final name only ever holds a complete asset.
    pub async fn write(&self, url: &str, bytes: &[u8]) -> Result<String, LocalizeError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let filename = self.filename(&self.naming.token_for(url));
        let path = self.dir.join(&filename);

        if tokio::fs::try_exists(&path).await? {
            if self.naming == AssetNaming::ContentAddressed {
                tracing::debug!("Asset writer: {} already exists, reusing", path.display());
                return Ok(filename);
            }
            return Err(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )
            .into());
        }

        let tmp = self.dir.join(format!(".{}.{}.part", filename, uuid::Uuid::new_v4().simple()));
        if let Err(e) = write_complete(&tmp, &path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!("Asset writer: Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(filename)
    }
}

async fn write_complete(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, path).await
}
