pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod ledger;
pub mod metadata;
pub mod progress;
pub mod sink;
pub mod sync;

// Re-export main types for convenience
pub use config::{FeedsConfig, feed_folder_name};
pub use episode::{
    Backoff, DownloadOutcome, RetryPolicy, build_filename, download_episode, media_extension,
    resolve_identifier, sanitize_filename, sanitize_stem,
};
pub use error::{
    ConfigError, DownloadError, EpisodeError, ErrorKind, FeedError, IdentityError, LedgerError,
    MediaError, MetadataError, SinkError, SyncError, TransportError,
};
pub use feed::{
    DEFAULT_ANCHOR, EmbeddedJsonExtractor, Episode, EpisodeList, EpisodeSource,
    MetadataExtractor, is_url,
};
pub use http::{DEFAULT_READ_TIMEOUT, HttpClient, HttpDocument, HttpResponse, ReqwestClient};
pub use ledger::{Ledger, LedgerEntry};
pub use metadata::{SidecarTagger, Tagger};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use sink::{Artifact, LocalSink, MemorySink, Sink, SinkReference};
pub use sync::{
    DEFAULT_DELAY, EpisodeFailure, SyncContext, SyncOptions, SyncRun, describe_source, sync_feed,
};
