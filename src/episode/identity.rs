// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

use crate::error::IdentityError;

/// Query parameters known to carry a narrow episode id, compared case-insensitively
const ID_QUERY_PARAMS: [&str; 2] = ["shiurid", "episodeid"];

/// Textual form of an embedded id, e.g. `shiurID:1159876` inside a path
static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:shiurid|episodeid)[=:](\d+)").expect("id regex is valid")
});

/// Derive the stable identifier of an episode.
///
/// Narrow ids embedded in the page URL or guid win over the raw guid,
/// which in turn wins over the page URL itself. Title text is never used.
pub fn resolve_identifier(
    title: &str,
    guid: Option<&str>,
    page_url: Option<&Url>,
) -> Result<String, IdentityError> {
    let guid = guid.map(str::trim).filter(|g| !g.is_empty());

    if let Some(id) = page_url
        .and_then(|url| narrow_id(url.as_str()))
        .or_else(|| guid.and_then(narrow_id))
    {
        trace!(%id, "using narrow identifier");
        return Ok(id);
    }

    if let Some(guid) = guid {
        return Ok(guid.to_string());
    }

    page_url
        .map(|url| url.to_string())
        .ok_or_else(|| IdentityError::Unresolvable {
            title: title.to_string(),
        })
}

/// Extract a numeric id from a URL query or an `id:<digits>` pattern
fn narrow_id(text: &str) -> Option<String> {
    if let Ok(url) = Url::parse(text)
        && let Some(value) = url
            .query_pairs()
            .find(|(key, value)| {
                !value.is_empty()
                    && ID_QUERY_PARAMS
                        .iter()
                        .any(|param| key.eq_ignore_ascii_case(param))
            })
            .map(|(_, value)| value.into_owned())
    {
        return Some(value);
    }

    ID_PATTERN
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}
