// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use bytes::Bytes;
use tracing::debug;

use crate::error::FeedError;
use crate::http::{HttpClient, is_success};

use super::parse::{FeedDocument, parse_feed};

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Bytes, FeedError> {
    let document = client
        .get_document(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !is_success(document.status) {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status: document.status,
        });
    }

    debug!(url, bytes = document.body.len(), "feed fetched");
    Ok(document.body)
}

/// Read raw feed bytes from a local file (without parsing)
pub fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    std::fs::read(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load and parse a feed from a URL or a local file path
pub async fn load_feed<C: HttpClient + ?Sized>(
    client: &C,
    source: &str,
) -> Result<FeedDocument, FeedError> {
    if is_url(source) {
        url::Url::parse(source)?;
        let bytes = fetch_feed_bytes(client, source).await?;
        parse_feed(&bytes)
    } else {
        let bytes = read_feed_file(Path::new(source))?;
        parse_feed(&bytes)
    }
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::{HttpDocument, HttpResponse};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct StatusClient {
        status: u16,
        body: &'static str,
    }

    #[async_trait]
    impl HttpClient for StatusClient {
        async fn get_document(&self, _url: &str) -> Result<HttpDocument, TransportError> {
            Ok(HttpDocument {
                status: self.status,
                body: Bytes::from_static(self.body.as_bytes()),
            })
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, TransportError> {
            unreachable!("feeds are fetched whole")
        }
    }

    struct DownClient;

    #[async_trait]
    impl HttpClient for DownClient {
        async fn get_document(&self, _url: &str) -> Result<HttpDocument, TransportError> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into())
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, TransportError> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into())
        }
    }

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><description>D</description>
<item><title>A</title><guid>1</guid><enclosure url="https://example.com/a.mp3" type="audio/mpeg"/></item>
</channel></rss>"#;

    #[test]
    fn is_url_detects_http() {
        assert!(is_url("http://example.com/feed.xml"));
        assert!(is_url("https://example.com/feed.xml"));
    }

    #[test]
    fn is_url_rejects_file_paths() {
        assert!(!is_url("/path/to/feed.xml"));
        assert!(!is_url("./feed.xml"));
        assert!(!is_url("feed.xml"));
    }

    #[tokio::test]
    async fn load_feed_from_url() {
        let client = StatusClient {
            status: 200,
            body: FEED,
        };
        let feed = load_feed(&client, "https://example.com/feed.xml")
            .await
            .unwrap();
        assert_eq!(feed.entries.len(), 1);
    }

    #[tokio::test]
    async fn load_feed_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, FEED).unwrap();

        let feed = load_feed(&DownClient, path.to_str().unwrap()).await.unwrap();
        assert_eq!(feed.title, "T");
    }

    #[tokio::test]
    async fn http_error_status_is_feed_error() {
        let client = StatusClient {
            status: 503,
            body: "unavailable",
        };
        let err = load_feed(&client, "https://example.com/feed.xml")
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn transport_failure_is_feed_error() {
        let err = load_feed(&DownClient, "https://example.com/feed.xml")
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_feed_error() {
        let err = load_feed(&DownClient, "/definitely/not/here.xml")
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::FileReadFailed { .. }));
    }
}
