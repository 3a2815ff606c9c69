use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::episode::DownloadOutcome;
use crate::error::MetadataError;
use crate::feed::Episode;

/// Serializable description of a materialized episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub identifier: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    pub downloaded_at: String,
    pub audio_location: String,
    pub size_bytes: u64,
    pub content_hash: String,
}

impl EpisodeMetadata {
    pub fn new(episode: &Episode, outcome: &DownloadOutcome) -> Self {
        Self {
            identifier: episode.identifier.clone(),
            title: episode.title.clone(),
            pub_date: episode.published_at.map(|dt| dt.to_rfc3339()),
            page_url: episode.page_url.as_ref().map(|u| u.to_string()),
            media_url: episode.media_url.as_ref().map(|u| u.to_string()),
            duration_seconds: episode.duration_seconds,
            downloaded_at: Utc::now().to_rfc3339(),
            audio_location: outcome.reference.location.clone(),
            size_bytes: outcome.bytes,
            content_hash: outcome.content_hash.clone(),
        }
    }
}

pub fn write_episode_metadata(
    metadata: &EpisodeMetadata,
    path: &Path,
) -> Result<(), MetadataError> {
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(path, json).map_err(|e| MetadataError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn read_episode_metadata(path: &Path) -> Result<EpisodeMetadata, MetadataError> {
    let content = std::fs::read_to_string(path).map_err(|e| MetadataError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| MetadataError::JsonParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::{episode, outcome};
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_copies_episode_and_outcome() {
        let metadata = EpisodeMetadata::new(&episode(), &outcome("Pesachim 2.mp3"));

        assert_eq!(metadata.identifier, "1159876");
        assert_eq!(metadata.title, "Pesachim 2");
        assert!(metadata.pub_date.is_some());
        assert_eq!(
            metadata.media_url.as_deref(),
            Some("https://download.yutorah.org/2024/1159876.mp3")
        );
        assert_eq!(metadata.duration_seconds, Some(1800));
        assert_eq!(metadata.audio_location, "Pesachim 2.mp3");
        assert_eq!(metadata.size_bytes, 42);
        assert_eq!(metadata.content_hash, "sha256:abc123");
    }

    #[test]
    fn write_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("episode.json");
        let metadata = EpisodeMetadata::new(&episode(), &outcome("a.mp3"));

        write_episode_metadata(&metadata, &path).unwrap();
        let read_back = read_episode_metadata(&path).unwrap();

        assert_eq!(read_back, metadata);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let bare = Episode {
            published_at: None,
            page_url: None,
            duration_seconds: None,
            ..episode()
        };
        let json =
            serde_json::to_string(&EpisodeMetadata::new(&bare, &outcome("a.mp3"))).unwrap();

        assert!(!json.contains("pub_date"));
        assert!(!json.contains("page_url"));
        assert!(!json.contains("duration_seconds"));
    }

    #[test]
    fn read_nonexistent_returns_error() {
        let dir = tempdir().unwrap();
        let result = read_episode_metadata(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(MetadataError::ReadFailed { .. })));
    }
}
