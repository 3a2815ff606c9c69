mod download;
mod filename;
mod identity;
mod retry;

pub use download::{DownloadOutcome, download_episode};
pub use filename::{
    MAX_STEM_BYTES, build_filename, media_extension, sanitize_filename, sanitize_stem,
    with_suffix,
};
pub use identity::resolve_identifier;
pub use retry::{Backoff, RetryPolicy, is_retryable};
