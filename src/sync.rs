// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::episode::{
    DownloadOutcome, RetryPolicy, build_filename, download_episode, media_extension, with_suffix,
};
use crate::error::{DownloadError, EpisodeError, ErrorKind, SinkError, SyncError};
use crate::feed::{Episode, EpisodeSource, MetadataExtractor, is_url};
use crate::http::HttpClient;
use crate::ledger::{Ledger, LedgerEntry};
use crate::metadata::Tagger;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::sink::Sink;

/// Default pause between processed episodes
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Options for one sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum number of new episodes to attempt (None = all)
    pub limit: Option<usize>,
    /// Pause before each processed episode after the first
    pub delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            limit: None,
            delay: DEFAULT_DELAY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything a sync run reads from or writes to
pub struct SyncContext<'a> {
    pub client: &'a dyn HttpClient,
    pub extractor: &'a dyn MetadataExtractor,
    pub sink: &'a dyn Sink,
    pub ledger: &'a mut Ledger,
    pub tagger: Option<&'a dyn Tagger>,
    pub reporter: SharedProgressReporter,
}

/// One episode that failed in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeFailure {
    /// Absent when the identifier itself could not be derived
    pub identifier: Option<String>,
    pub title: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Summary of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncRun {
    /// Well-formed entries offered by the feed
    pub requested: usize,
    /// Already in the ledger
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<EpisodeFailure>,
}

impl SyncRun {
    /// True when episodes were attempted and none of them succeeded
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.succeeded == 0
    }

    fn record_failure(&mut self, identifier: Option<String>, title: String, error: &EpisodeError) {
        self.failed += 1;
        self.failures.push(EpisodeFailure {
            identifier,
            title,
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}

/// Synchronize one feed into the context's sink.
///
/// Episodes are processed one at a time in feed order. An episode whose
/// identifier is in the ledger is skipped; anything else is resolved,
/// downloaded and then committed. Failures of single episodes are recorded
/// in the returned [`SyncRun`] and do not stop the run. Only an unreadable
/// feed or a ledger that cannot be written aborts it.
#[instrument(skip_all, fields(feed = %feed_source))]
pub async fn sync_feed(
    ctx: &mut SyncContext<'_>,
    feed_source: &str,
    options: &SyncOptions,
) -> Result<SyncRun, SyncError> {
    let reporter = ctx.reporter.clone();
    let source = EpisodeSource::new(ctx.client, ctx.extractor);

    reporter.report(ProgressEvent::FetchingFeed {
        source: feed_source.to_string(),
    });
    let episodes = source.list_episodes(feed_source).await?;

    reporter.report(ProgressEvent::FeedParsed {
        feed_title: episodes.feed_title.clone(),
        total_episodes: episodes.total(),
    });

    let mut run = SyncRun {
        requested: episodes.total(),
        ..SyncRun::default()
    };
    let mut attempted = 0;

    for item in episodes {
        if options.limit.is_some_and(|limit| attempted >= limit) {
            info!(attempted, "limit reached");
            break;
        }

        let episode = match item {
            Ok(episode) => episode,
            Err((title, e)) => {
                attempted += 1;
                let error = EpisodeError::from(e);
                warn!(%title, error = %error, "cannot identify episode");
                report_failure(&reporter, None, &title, &error);
                run.record_failure(None, title, &error);
                continue;
            }
        };

        if ctx.ledger.contains(&episode.identifier) {
            run.skipped += 1;
            reporter.report(ProgressEvent::EpisodeSkipped {
                identifier: episode.identifier,
                title: episode.title,
            });
            continue;
        }

        if attempted > 0 && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }
        attempted += 1;

        let identifier = episode.identifier.clone();
        let title = episode.title.clone();

        match materialize(ctx, &source, episode, options).await {
            Ok((episode, outcome)) => {
                let entry = LedgerEntry::new(Some(outcome.reference.location.clone()))
                    .with_content(outcome.bytes, outcome.content_hash.clone());
                ctx.ledger.commit(&episode.identifier, entry)?;
                run.succeeded += 1;

                reporter.report(ProgressEvent::DownloadCompleted {
                    identifier: episode.identifier.clone(),
                    title: episode.title.clone(),
                    bytes_downloaded: outcome.bytes,
                });

                if let Some(tagger) = ctx.tagger
                    && let Err(e) = tagger.tag(&episode, &outcome)
                {
                    warn!(identifier = %episode.identifier, error = %e, "tagging failed");
                }
            }
            Err(error) => {
                warn!(%identifier, error = %error, "episode failed");
                report_failure(&reporter, Some(&identifier), &title, &error);
                run.record_failure(Some(identifier), title, &error);
            }
        }
    }

    info!(
        skipped = run.skipped,
        succeeded = run.succeeded,
        failed = run.failed,
        "sync finished"
    );
    reporter.report(ProgressEvent::SyncCompleted {
        succeeded: run.succeeded,
        skipped: run.skipped,
        failed: run.failed,
    });

    Ok(run)
}

/// Resolve, name and download one episode; nothing is committed here
async fn materialize(
    ctx: &SyncContext<'_>,
    source: &EpisodeSource<'_>,
    episode: Episode,
    options: &SyncOptions,
) -> Result<(Episode, DownloadOutcome), EpisodeError> {
    let episode = if episode.media_url.is_none() {
        ctx.reporter.report(ProgressEvent::ResolvingMedia {
            identifier: episode.identifier.clone(),
            title: episode.title.clone(),
        });
        source.resolve(episode).await?
    } else {
        episode
    };

    let filename = filename_for(ctx, &episode)
        .await
        .map_err(DownloadError::from)?;
    let outcome = download_episode(
        ctx.client,
        ctx.sink,
        &episode,
        &filename,
        &options.retry,
        &ctx.reporter,
    )
    .await?;

    Ok((episode, outcome))
}

/// Title-based filename, disambiguated by identifier when the name is
/// taken, either by another ledger entry or by a stored artifact the
/// ledger does not account for
async fn filename_for(ctx: &SyncContext<'_>, episode: &Episode) -> Result<String, SinkError> {
    let extension = media_extension(episode.media_url.as_ref(), episode.mime_type.as_deref());
    let filename = build_filename(&episode.title, &extension);

    let taken = match ctx.ledger.owner_of_location(&ctx.sink.location(&filename)) {
        Some(owner) => owner != episode.identifier,
        None => ctx.sink.exists(&filename).await?,
    };

    if taken {
        debug!(identifier = %episode.identifier, %filename, "filename taken");
        Ok(with_suffix(&filename, &episode.identifier))
    } else {
        Ok(filename)
    }
}

fn report_failure(
    reporter: &SharedProgressReporter,
    identifier: Option<&str>,
    title: &str,
    error: &EpisodeError,
) {
    reporter.report(ProgressEvent::EpisodeFailed {
        identifier: identifier.map(str::to_string),
        title: title.to_string(),
        kind: error.kind(),
        error: error.to_string(),
    });
}

/// Describe a feed source for display: URLs as they are, paths by file name
pub fn describe_source(feed_source: &str) -> String {
    if is_url(feed_source) {
        return feed_source.to_string();
    }
    std::path::Path::new(feed_source)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| feed_source.to_string())
}
