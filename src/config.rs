// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::episode::sanitize_stem;
use crate::error::ConfigError;

/// Named feeds to sync in one batch, read from a JSON object of
/// `{ "<feed name>": "<feed url or path>" }`.
///
/// Iteration is ordered by feed name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct FeedsConfig {
    feeds: BTreeMap<String, String>,
}

impl FeedsConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// `(name, source)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.feeds.iter().map(|(name, url)| (name.as_str(), url.as_str()))
    }
}

/// Directory name used for a feed's episodes in batch mode
pub fn feed_folder_name(feed_name: &str) -> String {
    sanitize_stem(feed_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_name_to_url_map() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rss_feeds.json");
        std::fs::write(
            &path,
            r#"{
  "Rav Moshe Taragin": "http://www.yutorah.org/rss/RssAudioOnly/80307",
  "Daf Yomi": "https://example.com/daf.xml"
}"#,
        )
        .unwrap();

        let config = FeedsConfig::load(&path).unwrap();
        assert_eq!(config.len(), 2);

        let names: Vec<_> = config.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["Daf Yomi", "Rav Moshe Taragin"]);
    }

    #[test]
    fn rejects_non_object() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feeds.json");
        std::fs::write(&path, r#"["https://example.com/a.xml"]"#).unwrap();

        assert!(matches!(
            FeedsConfig::load(&path),
            Err(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            FeedsConfig::load(&dir.path().join("none.json")),
            Err(ConfigError::ReadFailed { .. })
        ));
    }

    #[test]
    fn folder_names_are_sanitized() {
        assert_eq!(feed_folder_name("Rav: Test / Shiurim"), "Rav- Test Shiurim");
        assert_eq!(feed_folder_name("הרב טרגין"), "הרב טרגין");
    }
}
