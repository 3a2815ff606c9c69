// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use url::Url;

/// Maximum length in bytes of a filename stem (extension not included)
pub const MAX_STEM_BYTES: usize = 150;

/// Stem used when nothing usable survives sanitization
const FALLBACK_STEM: &str = "untitled";

/// Extension used when neither the URL nor the MIME type gives one
const DEFAULT_EXTENSION: &str = "mp3";

/// Double quotes in all the forms seen in titles, Hebrew gershayim included
const QUOTE_CHARS: [char; 8] = [
    '"', '\u{201C}', '\u{201D}', '\u{05F4}', '\u{201F}', '\u{201E}', '\u{00AB}', '\u{00BB}',
];

/// ASCII colon and Hebrew sof pasuq
const COLON_CHARS: [char; 2] = [':', '\u{05C3}'];

/// Device names Windows refuses regardless of extension
const WINDOWS_RESERVED: [&str; 4] = ["con", "prn", "aux", "nul"];

/// Numbered device families (`com0`..`com9`, `lpt0`..`lpt9`)
const WINDOWS_RESERVED_NUMBERED: [&str; 2] = ["com", "lpt"];

/// Sanitize free text into a filename stem that is valid on every
/// supported filesystem.
///
/// Quotes become apostrophes, colons become dashes, characters Windows
/// rejects are removed, runs of spaces or dashes are collapsed and the
/// edges are trimmed of spaces, dots and dashes. Non-Latin scripts pass
/// through untouched. Stems longer than [`MAX_STEM_BYTES`] are cut at a
/// character boundary.
///
/// Applying this to its own output returns the output unchanged.
pub fn sanitize_stem(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| {
            if QUOTE_CHARS.contains(&c) {
                '\''
            } else if COLON_CHARS.contains(&c) {
                '-'
            } else if c.is_whitespace() {
                ' '
            } else {
                c
            }
        })
        .collect();

    // The crate drops a reserved name along with everything after its first dot
    let guarded = guard_reserved(trim_edges(&mapped));

    let cleaned = sanitize_filename::sanitize_with_options(
        &guarded,
        sanitize_filename::Options {
            windows: true,
            truncate: false,
            replacement: "",
        },
    );

    let collapsed = collapse_separators(&cleaned);
    let guarded = guard_reserved(trim_edges(&collapsed));
    let stem = trim_edges(truncate_to_bytes(&guarded, MAX_STEM_BYTES));

    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}

/// Sanitize a complete `stem.ext` filename, preserving a short extension
pub fn sanitize_filename(name: &str) -> String {
    match split_extension(name) {
        Some((stem, ext)) => format!("{}.{}", sanitize_stem(stem), ext.to_ascii_lowercase()),
        None => sanitize_stem(name),
    }
}

/// Build the filename for an episode from its title and media extension
pub fn build_filename(title: &str, extension: &str) -> String {
    let extension = if is_plain_extension(extension) {
        extension.to_ascii_lowercase()
    } else {
        DEFAULT_EXTENSION.to_string()
    };
    format!("{}.{}", sanitize_stem(title), extension)
}

/// Insert a disambiguating suffix before the extension
pub fn with_suffix(filename: &str, suffix: &str) -> String {
    let suffix = sanitize_stem(suffix);
    match split_extension(filename) {
        Some((stem, ext)) => {
            let budget = MAX_STEM_BYTES.saturating_sub(suffix.len() + 3);
            let stem = trim_edges(truncate_to_bytes(stem, budget));
            format!("{stem} [{suffix}].{ext}")
        }
        None => format!("{filename} [{suffix}]"),
    }
}

/// Get the media file extension for an episode
///
/// Attempts to extract from URL path or MIME type, defaults to "mp3"
pub fn media_extension(url: Option<&Url>, mime_type: Option<&str>) -> String {
    if let Some(ext) = url
        .and_then(|url| url.path_segments())
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| is_valid_audio_extension(ext))
    {
        return ext.to_lowercase();
    }

    if let Some(ext) = mime_type.and_then(mime_to_extension) {
        return ext.to_string();
    }

    DEFAULT_EXTENSION.to_string()
}

fn split_extension(name: &str) -> Option<(&str, &str)> {
    name.rsplit_once('.')
        .filter(|(_, ext)| is_plain_extension(ext))
}

fn is_plain_extension(ext: &str) -> bool {
    (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Whether Windows treats `name` as a device, i.e. `<device>` or
/// `<device>.<anything>`
fn is_windows_reserved(name: &str) -> bool {
    let base = name.split('.').next().unwrap_or(name).to_ascii_lowercase();
    WINDOWS_RESERVED.contains(&base.as_str())
        || WINDOWS_RESERVED_NUMBERED.iter().any(|family| {
            base.strip_prefix(*family)
                .is_some_and(|n| n.len() == 1 && n.as_bytes()[0].is_ascii_digit())
        })
}

/// Append `_` to a reserved device name, before any extension
fn guard_reserved(name: &str) -> String {
    if !is_windows_reserved(name) {
        return name.to_string();
    }
    match name.split_once('.') {
        Some((base, rest)) => format!("{base}_.{rest}"),
        None => format!("{name}_"),
    }
}

/// Collapse runs of spaces and runs of dashes into a single character
fn collapse_separators(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last: Option<char> = None;

    for c in s.chars() {
        if (c == ' ' || c == '-') && last == Some(c) {
            continue;
        }
        result.push(c);
        last = Some(c);
    }

    result
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c == '.' || c == '-' || c.is_whitespace())
}

/// Cut to at most `max_bytes` without splitting a character
fn truncate_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Check if a string is a valid audio file extension
fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

/// Map MIME types to file extensions
fn mime_to_extension(mime: &str) -> Option<&'static str> {
    match mime.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Sanitization tests ===

    #[test]
    fn sanitize_preserves_plain_titles() {
        assert_eq!(sanitize_stem("Episode 42 - Intro"), "Episode 42 - Intro");
    }

    #[test]
    fn sanitize_replaces_quotes_with_apostrophe() {
        assert_eq!(sanitize_stem("the \"blame game\""), "the 'blame game'");
        assert_eq!(sanitize_stem("\u{201C}smart\u{201D}"), "'smart'");
        assert_eq!(sanitize_stem("\u{00AB}angle\u{00BB}"), "'angle'");
    }

    #[test]
    fn sanitize_replaces_colons_with_dash() {
        assert_eq!(sanitize_stem("Part 1: Beginnings"), "Part 1- Beginnings");
        assert_eq!(sanitize_stem("a::b"), "a-b");
    }

    #[test]
    fn sanitize_removes_windows_invalid_chars() {
        assert_eq!(sanitize_stem("a<b>c/d\\e|f?g*h"), "abcdefgh");
    }

    #[test]
    fn sanitize_removes_control_chars_and_folds_whitespace() {
        assert_eq!(sanitize_stem("line1\nline2\ttab\u{0007}"), "line1 line2 tab");
    }

    #[test]
    fn sanitize_preserves_hebrew() {
        let title = "שיעור יומי מסכת פסחים פ\"ב";
        assert_eq!(sanitize_stem(title), "שיעור יומי מסכת פסחים פ'ב");
    }

    #[test]
    fn sanitize_maps_hebrew_punctuation() {
        assert_eq!(sanitize_stem("ב\u{05F4}ה\u{05C3}"), "ב'ה");
    }

    #[test]
    fn sanitize_preserves_accents_and_emoji() {
        assert_eq!(sanitize_stem("Café résumé 🎙️"), "Café résumé 🎙️");
    }

    #[test]
    fn sanitize_collapses_runs() {
        assert_eq!(sanitize_stem("a   b----c"), "a b-c");
    }

    #[test]
    fn sanitize_trims_edges() {
        assert_eq!(sanitize_stem("  --hello..  "), "hello");
        assert_eq!(sanitize_stem("ends with period."), "ends with period");
    }

    #[test]
    fn sanitize_falls_back_for_empty_result() {
        assert_eq!(sanitize_stem(""), "untitled");
        assert_eq!(sanitize_stem("???///"), "untitled");
        assert_eq!(sanitize_stem("..."), "untitled");
    }

    #[test]
    fn sanitize_guards_reserved_device_names() {
        assert_eq!(sanitize_stem("CON ."), "CON_");
        assert_eq!(sanitize_stem("CON_"), "CON_");
        assert_eq!(sanitize_stem("con.x"), "con_.x");
        assert_eq!(sanitize_stem("-con.x"), "con_.x");
        assert_eq!(sanitize_stem(" aux.txt"), "aux_.txt");
        assert_eq!(sanitize_stem("com0"), "com0_");
        assert_eq!(sanitize_stem("Lpt9.notes"), "Lpt9_.notes");
        assert_eq!(sanitize_stem("console"), "console");
        assert_eq!(sanitize_stem("com10"), "com10");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "10-minute-rashi-for-vayigash-the-\"blame-game\"-jewish-success-.mp3",
            "שיעור-יומי-מסכת-פסחים-פ\"א-40-חזרה-בענין-ביב\"י--עברית-",
            "a-ramban-for-vayigash--was-ya'akov-incredulous",
            "  weird : <name> ??  . ",
            "CON ",
            "-con.x",
            " aux.txt",
            "nul.",
            "com1.a.b",
            "<con>.mp3",
            &"ש".repeat(120),
            &format!("{} tail.", "x".repeat(149)),
        ];

        for input in inputs {
            let once = sanitize_stem(input);
            assert_eq!(sanitize_stem(&once), once, "stem of {input:?}");

            let once = sanitize_filename(input);
            assert_eq!(sanitize_filename(&once), once, "filename of {input:?}");
        }
    }

    // === Truncation tests ===

    #[test]
    fn stem_at_limit_is_untouched() {
        let title = "a".repeat(MAX_STEM_BYTES);
        assert_eq!(build_filename(&title, "mp3"), format!("{title}.mp3"));
    }

    #[test]
    fn stem_one_over_limit_is_truncated_keeping_extension() {
        let title = "a".repeat(MAX_STEM_BYTES + 1);
        let filename = build_filename(&title, "mp3");
        assert_eq!(filename, format!("{}.mp3", "a".repeat(MAX_STEM_BYTES)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Hebrew letters are two bytes each
        let title = "ש".repeat(100);
        let stem = sanitize_stem(&title);
        assert_eq!(stem.len(), MAX_STEM_BYTES);
        assert_eq!(stem.chars().count(), 75);
    }

    #[test]
    fn truncation_does_not_leave_trailing_separator() {
        let title = format!("{} tail", "x".repeat(MAX_STEM_BYTES - 1));
        let stem = sanitize_stem(&title);
        assert_eq!(stem, "x".repeat(MAX_STEM_BYTES - 1));
    }

    // === Full filename tests ===

    #[test]
    fn sanitize_filename_keeps_extension() {
        assert_eq!(sanitize_filename("Part: One?.MP3"), "Part- One.mp3");
        assert_eq!(sanitize_filename(".mp3"), "untitled.mp3");
    }

    #[test]
    fn build_filename_rejects_odd_extensions() {
        assert_eq!(build_filename("Talk", "m4a"), "Talk.m4a");
        assert_eq!(build_filename("Talk", "../x"), "Talk.mp3");
    }

    #[test]
    fn with_suffix_inserts_before_extension() {
        assert_eq!(with_suffix("Talk.mp3", "123"), "Talk [123].mp3");
        let long = format!("{}.mp3", "a".repeat(MAX_STEM_BYTES));
        let suffixed = with_suffix(&long, "123");
        assert!(suffixed.ends_with(" [123].mp3"));
        assert!(suffixed.len() <= MAX_STEM_BYTES + 4);
    }

    // === Extension extraction tests ===

    #[test]
    fn extracts_extension_from_url() {
        let url = Url::parse("https://example.com/episode.M4A?token=abc").unwrap();
        assert_eq!(media_extension(Some(&url), None), "m4a");
    }

    #[test]
    fn falls_back_to_mime_type() {
        let url = Url::parse("https://example.com/download/123").unwrap();
        assert_eq!(media_extension(Some(&url), Some("audio/ogg")), "ogg");
    }

    #[test]
    fn ignores_non_audio_extensions() {
        let url = Url::parse("https://example.com/episode.html").unwrap();
        assert_eq!(media_extension(Some(&url), None), "mp3");
        assert_eq!(media_extension(None, Some("application/octet-stream")), "mp3");
    }
}
