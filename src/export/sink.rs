//! Download sinks
//!
//! A sink accepts one named payload at a time. The filesystem sink writes
//! into a download directory and, like a browser, never overwrites an
//! existing file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// A named payload ready for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Hand the artifact off, returning where it ended up
    async fn download(&self, artifact: Artifact) -> Result<String, SinkError>;
}

/// Writes artifacts into a local directory
pub struct FsDownloadSink {
    directory: PathBuf,
}

impl FsDownloadSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// `name.ext`, then `name (1).ext`, `name (2).ext`, ...
    async fn unique_path(&self, filename: &str) -> PathBuf {
        let candidate = self.directory.join(filename);
        if !path_exists(&candidate).await {
            return candidate;
        }

        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{}", ext)),
            None => (filename, String::new()),
        };

        let mut n = 1;
        loop {
            let candidate = self.directory.join(format!("{} ({}){}", stem, n, ext));
            if !path_exists(&candidate).await {
                return candidate;
            }
            n += 1;
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[async_trait]
impl DownloadSink for FsDownloadSink {
    async fn download(&self, artifact: Artifact) -> Result<String, SinkError> {
        if artifact.filename.contains('/') || artifact.filename.contains('\\') {
            return Err(SinkError::Rejected(format!(
                "invalid filename {:?}",
                artifact.filename
            )));
        }

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| SinkError::Io {
                path: self.directory.clone(),
                source,
            })?;

        let path = self.unique_path(&artifact.filename).await;
        debug!("Writing {} ({}) to {:?}", artifact.filename, artifact.mime_type, path);

        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;

        info!(
            "Downloaded {:?} ({:.2} MB)",
            path,
            artifact.bytes.len() as f64 / (1024.0 * 1024.0)
        );
        Ok(path.display().to_string())
    }
}
