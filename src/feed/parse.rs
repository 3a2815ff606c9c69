// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use tracing::warn;
use url::Url;

use crate::error::FeedError;

/// A parsed feed document
#[derive(Debug, Clone)]
pub struct FeedDocument {
    pub title: String,
    pub entries: Vec<FeedEntry>,
}

/// One `<item>` of a feed, before identity or media resolution
#[derive(Debug, Clone)]
pub struct FeedEntry {
    /// `None` when the item has no usable title
    pub title: Option<String>,
    pub guid: Option<String>,
    /// Detail page of the episode (`<link>`)
    pub page_url: Option<Url>,
    pub enclosure: Option<Enclosure>,
    pub pub_date: Option<DateTime<FixedOffset>>,
    pub duration_seconds: Option<u64>,
}

/// Represents the audio file attached to an entry
#[derive(Debug, Clone)]
pub struct Enclosure {
    pub url: Url,
    pub length: Option<u64>,
    pub mime_type: Option<String>,
}

/// Parse RSS feed XML bytes.
///
/// Items that carry neither a page link nor an enclosure, or whose URLs do
/// not parse, are logged and skipped.
pub fn parse_feed(xml_bytes: &[u8]) -> Result<FeedDocument, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let entries = channel
        .items()
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match parse_entry(item) {
            Ok(entry) => Some(entry),
            Err(reason) => {
                warn!(
                    index,
                    title = item.title().unwrap_or(""),
                    reason,
                    "skipping malformed feed entry"
                );
                None
            }
        })
        .collect();

    Ok(FeedDocument {
        title: decode_text(channel.title()),
        entries,
    })
}

fn parse_entry(item: &rss::Item) -> Result<FeedEntry, &'static str> {
    let title = item.title().map(decode_text).filter(|t| !t.is_empty());

    let page_url = match item.link().map(str::trim).filter(|l| !l.is_empty()) {
        Some(link) => Some(Url::parse(link).map_err(|_| "invalid link URL")?),
        None => None,
    };

    let enclosure = match item.enclosure() {
        Some(enclosure) => Some(Enclosure {
            url: Url::parse(enclosure.url().trim()).map_err(|_| "invalid enclosure URL")?,
            length: enclosure.length().parse().ok().filter(|len| *len > 0),
            mime_type: Some(enclosure.mime_type().to_string()).filter(|s| !s.is_empty()),
        }),
        None => None,
    };

    if page_url.is_none() && enclosure.is_none() {
        return Err("neither link nor enclosure");
    }

    let pub_date = item.pub_date().and_then(|date_str| {
        DateTime::parse_from_rfc2822(date_str.trim())
            .or_else(|_| parse_relaxed_date(date_str.trim()))
            .ok()
    });

    let duration_seconds = item
        .itunes_ext()
        .and_then(|ext| ext.duration())
        .and_then(parse_duration);

    Ok(FeedEntry {
        title,
        guid: item.guid().map(|g| g.value().trim().to_string()),
        page_url,
        enclosure,
        pub_date,
        duration_seconds,
    })
}

/// Titles frequently arrive double-escaped; decode entities once more
fn decode_text(text: &str) -> String {
    html_escape::decode_html_entities(text.trim()).into_owned()
}

/// Parse `SS`, `MM:SS` or `HH:MM:SS` into seconds
pub fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    text.split(':').try_fold(0u64, |total, part| {
        let value: u64 = part.trim().parse().ok()?;
        total.checked_mul(60)?.checked_add(value)
    })
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    const FORMATS: [&str; 3] = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
        .map_or_else(|| DateTime::parse_from_rfc3339(date_str), Ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Rav Test &amp;amp; Friends</title>
    <description>Shiurim</description>
    <link>https://example.com</link>
    <item>
      <title><![CDATA[Shiur 1: Pesachim]]></title>
      <link>https://www.yutorah.org/lectures/details?shiurID=1001</link>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <itunes:duration>1:02:03</itunes:duration>
    </item>
    <item>
      <title>Episode 2</title>
      <guid>ep2-guid</guid>
      <enclosure url="https://example.com/ep2.mp3" length="1234567" type="audio/mpeg"/>
    </item>
    <item>
      <title>Nothing to fetch</title>
    </item>
    <item>
      <title>Broken link</title>
      <link>not a url</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parse_feed_extracts_entries() {
        let feed = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();

        assert_eq!(feed.title, "Rav Test & Friends");
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.title.as_deref(), Some("Shiur 1: Pesachim"));
        assert_eq!(
            first.page_url.as_ref().unwrap().as_str(),
            "https://www.yutorah.org/lectures/details?shiurID=1001"
        );
        assert!(first.enclosure.is_none());
        assert!(first.pub_date.is_some());
        assert_eq!(first.duration_seconds, Some(3723));

        let second = &feed.entries[1];
        assert_eq!(second.guid.as_deref(), Some("ep2-guid"));
        let enclosure = second.enclosure.as_ref().unwrap();
        assert_eq!(enclosure.length, Some(1234567));
        assert_eq!(enclosure.mime_type.as_deref(), Some("audio/mpeg"));
    }

    #[test]
    fn parse_feed_preserves_entry_order() {
        let feed = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();
        let titles: Vec<_> = feed.entries.iter().map(|e| e.title.as_deref()).collect();
        assert_eq!(titles, [Some("Shiur 1: Pesachim"), Some("Episode 2")]);
    }

    #[test]
    fn missing_or_blank_titles_are_none() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><description>D</description>
<item><guid>1</guid><enclosure url="https://cdn.example.com/1.mp3" type="audio/mpeg"/></item>
<item><title>   </title><guid>2</guid><enclosure url="https://cdn.example.com/2.mp3" type="audio/mpeg"/></item>
<item><title>Untitled Episode</title><guid>3</guid><enclosure url="https://cdn.example.com/3.mp3" type="audio/mpeg"/></item>
</channel></rss>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();

        let titles: Vec<_> = feed.entries.iter().map(|e| e.title.as_deref()).collect();
        assert_eq!(titles, [None, None, Some("Untitled Episode")]);
    }

    #[test]
    fn parse_feed_rejects_non_rss() {
        assert!(parse_feed(b"<html><body>nope</body></html>").is_err());
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("45"), Some(45));
        assert_eq!(parse_duration("30:00"), Some(1800));
        assert_eq!(parse_duration("1:00:01"), Some(3601));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("about an hour"), None);
    }

    #[test]
    fn relaxed_dates_are_accepted() {
        assert!(parse_relaxed_date("2024-01-15T10:00:00+02:00").is_ok());
        assert!(parse_relaxed_date("yesterday").is_err());
    }
}
