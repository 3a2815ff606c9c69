use std::sync::Arc;
use std::time::Duration;

use crate::error::ErrorKind;

/// Events emitted during a sync run for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched or read
    FetchingFeed { source: String },

    /// Feed has been parsed successfully
    FeedParsed {
        feed_title: String,
        total_episodes: usize,
    },

    /// Episode is already in the ledger
    EpisodeSkipped { identifier: String, title: String },

    /// Detail page is being fetched to find the media URL
    ResolvingMedia { identifier: String, title: String },

    /// A download attempt is starting
    DownloadStarting {
        identifier: String,
        title: String,
        filename: String,
        /// 1-based attempt number
        attempt: u32,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        identifier: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// An attempt failed and another one follows after `delay`
    DownloadRetrying {
        identifier: String,
        title: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },

    /// Episode was downloaded and committed to the ledger
    DownloadCompleted {
        identifier: String,
        title: String,
        bytes_downloaded: u64,
    },

    /// Episode failed for good in this run
    EpisodeFailed {
        identifier: Option<String>,
        title: String,
        kind: ErrorKind,
        error: String,
    },

    /// Leftover partial files from an interrupted run were removed
    PartialFilesCleanedUp { count: usize },

    /// Sync run completed
    SyncCompleted {
        succeeded: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// Silently ignores all events; used in quiet mode and tests
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Collects every event it receives
    #[derive(Default)]
    pub struct RecordingReporter {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl RecordingReporter {
        pub fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
