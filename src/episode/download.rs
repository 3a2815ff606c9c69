// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::DownloadError;
use crate::feed::Episode;
use crate::http::{ByteStream, HttpClient, is_success};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::sink::{Artifact, Sink, SinkReference};

use super::retry::{RetryPolicy, is_retryable};

/// Result of a successful download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub reference: SinkReference,
    pub bytes: u64,
    /// `sha256:<hex>` digest of the stored bytes
    pub content_hash: String,
}

/// Download an episode's media into `sink` under `filename`.
///
/// Network failures and truncated bodies are retried according to
/// `policy`; HTTP error statuses and sink failures are not. Nothing is
/// left in the sink under `filename` unless the download succeeds.
#[instrument(skip_all, fields(identifier = %episode.identifier, filename = %filename))]
pub async fn download_episode<C: HttpClient + ?Sized>(
    client: &C,
    sink: &dyn Sink,
    episode: &Episode,
    filename: &str,
    policy: &RetryPolicy,
    reporter: &SharedProgressReporter,
) -> Result<DownloadOutcome, DownloadError> {
    let url = episode
        .media_url
        .as_ref()
        .ok_or_else(|| DownloadError::Unresolved {
            identifier: episode.identifier.clone(),
        })?;

    let mut attempt = 0;
    loop {
        attempt += 1;

        let error = match attempt_download(client, sink, episode, url, filename, attempt, reporter)
            .await
        {
            Ok(outcome) => return Ok(outcome),
            Err(e) => e,
        };

        if !is_retryable(&error) {
            return Err(error);
        }
        let Some(delay) = policy.next_delay(attempt) else {
            return Err(error);
        };

        warn!(attempt, ?delay, error = %error, "download attempt failed, retrying");
        reporter.report(ProgressEvent::DownloadRetrying {
            identifier: episode.identifier.clone(),
            title: episode.title.clone(),
            attempt,
            delay,
            error: error.to_string(),
        });
        tokio::time::sleep(delay).await;
    }
}

async fn attempt_download<C: HttpClient + ?Sized>(
    client: &C,
    sink: &dyn Sink,
    episode: &Episode,
    url: &Url,
    filename: &str,
    attempt: u32,
    reporter: &SharedProgressReporter,
) -> Result<DownloadOutcome, DownloadError> {
    let response = client
        .get_stream(url.as_str())
        .await
        .map_err(|e| DownloadError::Network {
            url: url.to_string(),
            source: e,
        })?;

    if !is_success(response.status) {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        identifier: episode.identifier.clone(),
        title: episode.title.clone(),
        filename: filename.to_string(),
        attempt,
        content_length: response.content_length,
    });

    let mut artifact = sink.create(filename).await?;
    let mut hasher = Sha256::new();

    let streamed = stream_body(
        artifact.as_mut(),
        response.body,
        &mut hasher,
        &episode.identifier,
        url,
        response.content_length,
        reporter,
    )
    .await;

    let bytes = match streamed {
        Ok(bytes) => bytes,
        Err(e) => {
            artifact.abort().await;
            return Err(e);
        }
    };

    if let Some(expected) = response.content_length
        && expected != bytes
    {
        artifact.abort().await;
        return Err(DownloadError::SizeMismatch {
            url: url.to_string(),
            expected,
            actual: bytes,
        });
    }

    let reference = artifact.finish().await?;
    let content_hash = format!("sha256:{:x}", hasher.finalize());
    debug!(bytes, %content_hash, location = %reference.location, "download stored");

    Ok(DownloadOutcome {
        reference,
        bytes,
        content_hash,
    })
}

async fn stream_body(
    artifact: &mut dyn Artifact,
    mut body: ByteStream,
    hasher: &mut Sha256,
    identifier: &str,
    url: &Url,
    total_bytes: Option<u64>,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let mut bytes_downloaded: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| DownloadError::Network {
            url: url.to_string(),
            source: e,
        })?;

        artifact.write(&chunk).await?;
        hasher.update(&chunk);
        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            identifier: identifier.to_string(),
            bytes_downloaded,
            total_bytes,
        });
    }

    Ok(bytes_downloaded)
}
