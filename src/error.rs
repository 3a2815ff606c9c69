// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-level failure of an HTTP exchange
#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when fetching or parsing RSS feeds.
///
/// Any of these aborts the run for the affected feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("HTTP error {status} fetching feed {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// No stable identifier could be derived for a feed entry
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Episode '{title}' has neither an id nor a page URL")]
    Unresolvable { title: String },
}

/// Errors resolving the direct media URL of an episode
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to fetch episode page {url}: {source}")]
    PageFetchFailed {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("HTTP error {status} fetching episode page {url}")]
    PageStatus { url: String, status: u16 },

    #[error("Anchor '{anchor}' not found in episode page")]
    AnchorNotFound { anchor: String },

    #[error("Embedded payload is not valid JSON: {0}")]
    PayloadParse(#[source] serde_json::Error),

    #[error("Embedded payload has no '{field}' field")]
    MissingField { field: &'static str },

    #[error("Invalid media URL '{url}': {source}")]
    InvalidMediaUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Episode '{title}' has no enclosure and no page URL")]
    NoMediaSource { title: String },
}

/// Errors writing to a sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to check for {path}: {source}")]
    LookupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to finalize {path}: {source}")]
    FinalizeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur during episode downloads
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Size mismatch for {url}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("No media URL resolved for episode {identifier}")]
    Unresolved { identifier: String },

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors loading or persisting the dedup ledger.
///
/// Always fatal: without a durable ledger nothing guarantees at-most-once.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to read ledger {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write ledger {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize ledger: {0}")]
    SerializeFailed(#[from] serde_json::Error),
}

/// Errors that can occur during metadata operations
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to read metadata file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write metadata file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse metadata JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
}

/// Errors loading the feeds catalogue
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read feeds file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Feeds file {path} is not a JSON object of name to URL: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A failure confined to one episode; the run continues
#[derive(Error, Debug)]
pub enum EpisodeError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl EpisodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EpisodeError::Identity(_) => ErrorKind::IdentityResolution,
            EpisodeError::Media(_) | EpisodeError::Download(DownloadError::Unresolved { .. }) => {
                ErrorKind::MediaResolution
            }
            EpisodeError::Download(DownloadError::Network { .. }) => ErrorKind::Network,
            EpisodeError::Download(DownloadError::HttpStatus { status, .. }) => {
                ErrorKind::HttpStatus(*status)
            }
            EpisodeError::Download(DownloadError::SizeMismatch { .. }) => ErrorKind::SizeMismatch,
            EpisodeError::Download(DownloadError::Sink(_)) => ErrorKind::Sink,
        }
    }
}

/// Classification of a per-episode failure as recorded in a sync summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    IdentityResolution,
    MediaResolution,
    Network,
    HttpStatus(u16),
    SizeMismatch,
    Sink,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::IdentityResolution => f.write_str("identity"),
            ErrorKind::MediaResolution => f.write_str("media"),
            ErrorKind::Network => f.write_str("network"),
            ErrorKind::HttpStatus(code) => write!(f, "http {code}"),
            ErrorKind::SizeMismatch => f.write_str("size mismatch"),
            ErrorKind::Sink => f.write_str("sink"),
        }
    }
}

/// Top-level errors for sync operations; each aborts the run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}
