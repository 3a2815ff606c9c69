// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{Artifact, Sink, SinkReference};
use crate::error::SinkError;

const PARTIAL_SUFFIX: &str = ".partial";

/// Writes episodes into a directory on the local filesystem.
///
/// Data is streamed into `<name>.partial` and renamed into place once
/// complete, so an interrupted download never looks finished.
///
/// Locations are plain filenames unless the sink is given a prefix with
/// [`LocalSink::with_prefix`], usually the feed folder below a shared
/// output root.
#[derive(Debug, Clone)]
pub struct LocalSink {
    dir: PathBuf,
    prefix: Option<String>,
}

impl LocalSink {
    /// Open (creating if needed) the output directory.
    ///
    /// Returns the sink together with the number of stale `.partial`
    /// files from interrupted runs that were removed.
    pub fn open(dir: &Path) -> Result<(Self, usize), SinkError> {
        std::fs::create_dir_all(dir).map_err(|e| SinkError::CreateDirectoryFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let cleaned = clean_partial_files(dir)?;
        if cleaned > 0 {
            debug!(dir = %dir.display(), cleaned, "removed partial files");
        }

        Ok((
            Self {
                dir: dir.to_path_buf(),
                prefix: None,
            },
            cleaned,
        ))
    }

    /// Record locations as `<prefix>/<filename>`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Sink for LocalSink {
    fn location(&self, filename: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{filename}"),
            None => filename.to_string(),
        }
    }

    async fn exists(&self, filename: &str) -> Result<bool, SinkError> {
        let path = self.dir.join(filename);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| SinkError::LookupFailed { path, source: e })
    }

    async fn create(&self, filename: &str) -> Result<Box<dyn Artifact>, SinkError> {
        let final_path = self.dir.join(filename);
        let partial_path = self.dir.join(format!("{filename}{PARTIAL_SUFFIX}"));

        let file = File::create(&partial_path)
            .await
            .map_err(|e| SinkError::FileCreateFailed {
                path: partial_path.clone(),
                source: e,
            })?;

        Ok(Box::new(LocalArtifact {
            file: Some(file),
            partial_path,
            final_path,
            location: self.location(filename),
            written: 0,
        }))
    }
}

struct LocalArtifact {
    file: Option<File>,
    partial_path: PathBuf,
    final_path: PathBuf,
    location: String,
    written: u64,
}

#[async_trait]
impl Artifact for LocalArtifact {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        file.write_all(chunk)
            .await
            .map_err(|e| SinkError::FileWriteFailed {
                path: self.partial_path.clone(),
                source: e,
            })?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<SinkReference, SinkError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|e| SinkError::FileWriteFailed {
                path: self.partial_path.clone(),
                source: e,
            })?;
            file.sync_all()
                .await
                .map_err(|e| SinkError::FileWriteFailed {
                    path: self.partial_path.clone(),
                    source: e,
                })?;
        }

        tokio::fs::rename(&self.partial_path, &self.final_path)
            .await
            .map_err(|e| SinkError::FinalizeFailed {
                path: self.final_path.clone(),
                source: e,
            })?;

        // Renamed away; nothing left for Drop to clean up
        self.partial_path = PathBuf::new();

        Ok(SinkReference {
            location: self.location.clone(),
            size_bytes: self.written,
        })
    }

    async fn abort(mut self: Box<Self>) {
        drop(self.file.take());
        if let Err(e) = tokio::fs::remove_file(&self.partial_path).await {
            warn!(path = %self.partial_path.display(), error = %e, "failed to remove partial file");
        }
        self.partial_path = PathBuf::new();
    }
}

impl Drop for LocalArtifact {
    fn drop(&mut self) {
        // Reached when a download is cancelled mid-stream
        if !self.partial_path.as_os_str().is_empty() {
            drop(self.file.take());
            let _ = std::fs::remove_file(&self.partial_path);
        }
    }
}

/// Remove `.partial` files left behind by interrupted runs
fn clean_partial_files(dir: &Path) -> Result<usize, SinkError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SinkError::ReadDirectoryFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut cleaned = 0;
    for entry in entries {
        let entry = entry.map_err(|e| SinkError::ReadDirectoryFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let path = entry.path();
        let is_partial = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX));

        if is_partial && std::fs::remove_file(&path).is_ok() {
            cleaned += 1;
        }
    }

    Ok(cleaned)
}
