mod extract;
mod fetch;
mod parse;
mod source;

pub use extract::{DEFAULT_ANCHOR, EmbeddedJsonExtractor, MetadataExtractor, PageMetadata};
pub use fetch::{fetch_feed_bytes, is_url, load_feed, read_feed_file};
pub use parse::{Enclosure, FeedDocument, FeedEntry, parse_duration, parse_feed};
pub use source::{Episode, EpisodeList, EpisodeSource};
