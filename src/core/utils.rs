use chrono::{DateTime, Utc};
use lazy_regex::regex;

use crate::core::config;

/// Reduces a free-form video title to a filesystem-safe token.
///
/// Characters outside `[A-Za-z0-9_- ]` are dropped, runs of whitespace become a
/// single underscore and the result is cut to `config::download::TITLE_MAX_LEN`
/// characters. Leading/trailing whitespace (yt-dlp prints the title followed by a
/// newline) is trimmed first.
///
/// # Example
///
/// ```
/// use tubevault::core::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("My Video!!\n"), "My_Video");
/// assert_eq!(sanitize_filename("Artist - Title (Live)"), "Artist_-_Title_Live");
/// ```
pub fn sanitize_filename(title: &str) -> String {
    let stripped = regex!(r"[^A-Za-z0-9_\- ]").replace_all(title.trim(), "");
    let collapsed = regex!(r"\s+").replace_all(stripped.trim(), "_");
    // Only ASCII survives the first pass, so byte and char counts agree.
    collapsed.chars().take(config::download::TITLE_MAX_LEN).collect()
}

/// Builds the unique output file name for a job: `<sanitized>_<millis>.<ext>`.
///
/// Titles that sanitize to nothing (emoji-only, CJK) fall back to `video`.
pub fn build_output_name(raw_title: &str, now: DateTime<Utc>) -> String {
    let sanitized = sanitize_filename(raw_title);
    let base = if sanitized.is_empty() { "video" } else { sanitized.as_str() };
    format!(
        "{}_{}.{}",
        base,
        now.timestamp_millis(),
        config::download::OUTPUT_EXTENSION
    )
}

/// Formats a byte count as megabytes with two decimals, e.g. `12.34 MB`
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Cuts a string to at most `max_bytes`, keeping the tail and a valid UTF-8 boundary
pub fn truncate_tail_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Video!!"), "My_Video");
        assert_eq!(sanitize_filename("  spaced   out  "), "spaced_out");
        assert_eq!(sanitize_filename("keep-dashes_and_underscores"), "keep-dashes_and_underscores");
        assert_eq!(sanitize_filename("Привет мир"), "");
        assert_eq!(sanitize_filename("a/b\\c:d*e?f"), "abcdef");
    }

    #[test]
    fn test_sanitize_filename_bounds_length() {
        let long = "word ".repeat(40);
        let result = sanitize_filename(&long);
        assert_eq!(result.len(), 50);
        assert!(result
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' '));
    }

    #[test]
    fn test_build_output_name() {
        let now = Utc.timestamp_millis_opt(1_717_000_000_123).unwrap();
        assert_eq!(build_output_name("My Video!!", now), "My_Video_1717000000123.mp4");
        assert_eq!(build_output_name("🎵🎵", now), "video_1717000000123.mp4");
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(0), "0.00 MB");
        assert_eq!(format_megabytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_megabytes(12_939_428), "12.34 MB");
    }

    #[test]
    fn test_truncate_tail_utf8() {
        assert_eq!(truncate_tail_utf8("short", 10), "short");
        assert_eq!(truncate_tail_utf8("abcdef", 3), "def");
        // "é" is two bytes; never split it
        assert_eq!(truncate_tail_utf8("aéb", 2), "b");
    }
}
