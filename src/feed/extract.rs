// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extraction of episode metadata embedded in detail pages.

use serde::Deserialize;
use serde_json::Value;

use crate::error::MediaError;

use super::parse::parse_duration;

/// Token that precedes the embedded lecture object on detail pages
pub const DEFAULT_ANCHOR: &str = "lectureData";

/// Fields recovered from an episode's detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMetadata {
    pub download_url: String,
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub duration_seconds: Option<u64>,
}

/// Turns raw page bytes into structured episode metadata
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, page: &[u8]) -> Result<PageMetadata, MediaError>;
}

/// Finds a JSON object that follows a fixed textual anchor in a page,
/// e.g. `var lectureData = { ... };` inside a `<script>` block.
#[derive(Debug, Clone)]
pub struct EmbeddedJsonExtractor {
    anchor: String,
}

impl EmbeddedJsonExtractor {
    pub fn new(anchor: impl Into<String>) -> Self {
        Self {
            anchor: anchor.into(),
        }
    }
}

impl Default for EmbeddedJsonExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_ANCHOR)
    }
}

#[derive(Deserialize)]
struct EmbeddedPayload {
    #[serde(rename = "downloadURL", alias = "downloadUrl", default)]
    download_url: Option<String>,
    #[serde(rename = "shiurID", default)]
    identifier: Option<Value>,
    #[serde(rename = "shiurTitle", default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<Value>,
}

impl MetadataExtractor for EmbeddedJsonExtractor {
    fn extract(&self, page: &[u8]) -> Result<PageMetadata, MediaError> {
        let text = String::from_utf8_lossy(page);
        let anchor_not_found = || MediaError::AnchorNotFound {
            anchor: self.anchor.clone(),
        };

        let start = text.find(&self.anchor).ok_or_else(anchor_not_found)?;
        let after_anchor = &text[start + self.anchor.len()..];
        let brace = after_anchor.find('{').ok_or_else(anchor_not_found)?;

        // Only the first value matters; whatever follows it (`;</script>...`) is ignored
        let payload = serde_json::Deserializer::from_str(&after_anchor[brace..])
            .into_iter::<EmbeddedPayload>()
            .next()
            .ok_or_else(anchor_not_found)?
            .map_err(MediaError::PayloadParse)?;

        let download_url = payload
            .download_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or(MediaError::MissingField {
                field: "downloadURL",
            })?;

        Ok(PageMetadata {
            download_url,
            identifier: payload.identifier.as_ref().and_then(scalar_to_string),
            title: payload
                .title
                .map(|t| html_escape::decode_html_entities(t.trim()).into_owned())
                .filter(|t| !t.is_empty()),
            duration_seconds: payload.duration.as_ref().and_then(duration_seconds),
        })
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn duration_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => parse_duration(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
<script type="text/javascript">
  var lectureData = {"shiurID": 1159876, "shiurTitle": "Pesachim 2 &amp; 3", "downloadURL": "https://download.yutorah.org/2024/1053/1159876.mp3", "duration": "1:02:03", "speaker": {"name": "R. Test"}};
  var other = {};
</script>
</head><body>...</body></html>"#;

    #[test]
    fn extracts_payload_after_anchor() {
        let metadata = EmbeddedJsonExtractor::default()
            .extract(PAGE.as_bytes())
            .unwrap();

        assert_eq!(
            metadata.download_url,
            "https://download.yutorah.org/2024/1053/1159876.mp3"
        );
        assert_eq!(metadata.identifier.as_deref(), Some("1159876"));
        assert_eq!(metadata.title.as_deref(), Some("Pesachim 2 & 3"));
        assert_eq!(metadata.duration_seconds, Some(3723));
    }

    #[test]
    fn accepts_numeric_duration_and_string_id() {
        let page = r#"x lectureData={"shiurID":"abc","downloadUrl":"https://e.com/a.mp3","duration":95}"#;
        let metadata = EmbeddedJsonExtractor::default()
            .extract(page.as_bytes())
            .unwrap();

        assert_eq!(metadata.identifier.as_deref(), Some("abc"));
        assert_eq!(metadata.duration_seconds, Some(95));
    }

    #[test]
    fn custom_anchor_is_honoured() {
        let page = r#"window.__EPISODE__ = {"downloadURL": "https://e.com/b.mp3"}"#;
        let metadata = EmbeddedJsonExtractor::new("__EPISODE__")
            .extract(page.as_bytes())
            .unwrap();
        assert_eq!(metadata.download_url, "https://e.com/b.mp3");
    }

    #[test]
    fn missing_anchor_fails() {
        let err = EmbeddedJsonExtractor::default()
            .extract(b"<html>no data here</html>")
            .unwrap_err();
        assert!(matches!(err, MediaError::AnchorNotFound { .. }));
    }

    #[test]
    fn malformed_payload_fails() {
        let page = r#"var lectureData = {"downloadURL": "https://e.com/a.mp3", broken"#;
        let err = EmbeddedJsonExtractor::default()
            .extract(page.as_bytes())
            .unwrap_err();
        assert!(matches!(err, MediaError::PayloadParse(_)));
    }

    #[test]
    fn payload_without_download_url_fails() {
        let page = r#"var lectureData = {"shiurID": 5, "downloadURL": ""};"#;
        let err = EmbeddedJsonExtractor::default()
            .extract(page.as_bytes())
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::MissingField {
                field: "downloadURL"
            }
        ));
    }
}
