// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use tracing::debug;
use url::Url;

use crate::episode::resolve_identifier;
use crate::error::{FeedError, IdentityError, MediaError};
use crate::http::{HttpClient, is_success};

use super::extract::MetadataExtractor;
use super::fetch::load_feed;
use super::parse::FeedEntry;

/// Display title for entries the feed leaves untitled
const UNTITLED: &str = "Untitled Episode";

/// One episode offered by a feed
#[derive(Debug, Clone)]
pub struct Episode {
    /// Stable key used for deduplication
    pub identifier: String,
    pub title: String,
    /// The feed gave no title and `title` is a placeholder
    pub untitled: bool,
    pub published_at: Option<DateTime<FixedOffset>>,
    /// Detail page, when the feed links to one
    pub page_url: Option<Url>,
    /// Direct media URL; `None` until resolved
    pub media_url: Option<Url>,
    pub mime_type: Option<String>,
    pub duration_seconds: Option<u64>,
    pub size_bytes: Option<u64>,
}

impl Episode {
    fn from_entry(entry: FeedEntry) -> Result<Self, IdentityError> {
        let untitled = entry.title.is_none();
        let title = entry.title.unwrap_or_else(|| UNTITLED.to_string());
        let identifier =
            resolve_identifier(&title, entry.guid.as_deref(), entry.page_url.as_ref())?;

        let (media_url, mime_type, size_bytes) = match entry.enclosure {
            Some(enclosure) => (Some(enclosure.url), enclosure.mime_type, enclosure.length),
            None => (None, None, None),
        };

        Ok(Self {
            identifier,
            title,
            untitled,
            published_at: entry.pub_date,
            page_url: entry.page_url,
            media_url,
            mime_type,
            duration_seconds: entry.duration_seconds,
            size_bytes,
        })
    }
}

/// Episodes of one feed in feed order.
///
/// The feed document has already been fetched and parsed in full; identity
/// is derived lazily as the list is consumed. Not restartable: load the
/// feed again for a fresh pass.
#[derive(Debug)]
pub struct EpisodeList {
    pub feed_title: String,
    total: usize,
    entries: std::vec::IntoIter<FeedEntry>,
}

impl EpisodeList {
    /// Number of well-formed entries in the feed
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for EpisodeList {
    type Item = Result<Episode, (String, IdentityError)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|entry| {
            let title = entry.title.clone().unwrap_or_else(|| UNTITLED.to_string());
            Episode::from_entry(entry).map_err(|e| (title, e))
        })
    }
}

/// Reads episodes from feeds and resolves their media URLs
pub struct EpisodeSource<'a> {
    client: &'a dyn HttpClient,
    extractor: &'a dyn MetadataExtractor,
}

impl<'a> EpisodeSource<'a> {
    pub fn new(client: &'a dyn HttpClient, extractor: &'a dyn MetadataExtractor) -> Self {
        Self { client, extractor }
    }

    /// Fetch and parse the feed at `source` (a URL or a local file).
    ///
    /// Fails only when the feed itself is unavailable or unreadable.
    pub async fn list_episodes(&self, source: &str) -> Result<EpisodeList, FeedError> {
        let feed = load_feed(self.client, source).await?;
        debug!(source, entries = feed.entries.len(), "feed parsed");

        Ok(EpisodeList {
            feed_title: feed.title,
            total: feed.entries.len(),
            entries: feed.entries.into_iter(),
        })
    }

    /// Make sure `episode` has a direct media URL.
    ///
    /// Episodes that already carry one from the feed are returned as they
    /// are; otherwise the detail page is fetched and its embedded payload
    /// is extracted.
    pub async fn resolve(&self, mut episode: Episode) -> Result<Episode, MediaError> {
        if episode.media_url.is_some() {
            return Ok(episode);
        }

        let page_url = episode
            .page_url
            .clone()
            .ok_or_else(|| MediaError::NoMediaSource {
                title: episode.title.clone(),
            })?;

        let document = self
            .client
            .get_document(page_url.as_str())
            .await
            .map_err(|e| MediaError::PageFetchFailed {
                url: page_url.to_string(),
                source: e,
            })?;

        if !is_success(document.status) {
            return Err(MediaError::PageStatus {
                url: page_url.to_string(),
                status: document.status,
            });
        }

        let metadata = self.extractor.extract(&document.body)?;

        let media_url = page_url
            .join(&metadata.download_url)
            .map_err(|e| MediaError::InvalidMediaUrl {
                url: metadata.download_url.clone(),
                source: e,
            })?;

        if let Some(page_id) = metadata.identifier.as_deref()
            && page_id != episode.identifier
        {
            debug!(
                identifier = %episode.identifier,
                page_id,
                "page reports a different id; keeping the feed identifier"
            );
        }

        if episode.untitled
            && let Some(title) = metadata.title
        {
            episode.title = title;
            episode.untitled = false;
        }
        episode.duration_seconds = episode.duration_seconds.or(metadata.duration_seconds);
        episode.media_url = Some(media_url);

        Ok(episode)
    }
}
