// fetch-core - Media Fetch Core
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! File name sanitizing
//!
//! Page titles and remote file names become local file names here.
//! - Reserved and control characters become `_`
//! - Runs of whitespace collapse to one space
//! - Leading/trailing whitespace and trailing dots are dropped
//! - Length is capped at 255 bytes on a UTF-8 boundary

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const MAX_COMPONENT_LENGTH: usize = 255;

fn whitespace_regex() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn is_reserved(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

/// Make `name` safe to use as a single path component
///
/// Returns an empty string when nothing usable is left.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if is_reserved(c) && !c.is_whitespace() { '_' } else { c })
        .collect();

    let collapsed = whitespace_regex().replace_all(&replaced, " ");
    let trimmed = collapsed.trim().trim_end_matches('.').trim_end();

    truncate_component(trimmed, MAX_COMPONENT_LENGTH)
}

/// Sanitized `name`, or `fallback` when the name sanitizes to nothing
pub fn file_name_or(name: &str, fallback: &str) -> String {
    let sanitized = sanitize_filename(name);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        sanitize_filename(fallback)
    } else {
        sanitized
    }
}

/// Truncate to at most `max_bytes` without splitting a character
pub fn truncate_component(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut index = max_bytes;
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    text[..index].to_string()
}

/// Extension of a remote file name, if it has a sensible one
pub fn extension_of(name: &str) -> Option<&str> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

/// `path` with `extension` appended when it has none
pub fn with_missing_extension(path: &Path, extension: &str) -> Option<PathBuf> {
    if path.extension().is_some() {
        return None;
    }
    let mut name = path.file_name()?.to_os_string();
    name.push(".");
    name.push(extension);
    Some(path.with_file_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_reserved_characters() {
        assert_eq!(sanitize_filename("Episode 1: Pilot?"), "Episode 1_ Pilot_");
        assert_eq!(sanitize_filename("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_filename("  spaced \t\n out.  "), "spaced out");
    }

    #[test]
    fn test_sanitize_keeps_unicode() {
        assert_eq!(sanitize_filename("Phim hay - Tập 2"), "Phim hay - Tập 2");
    }

    #[test]
    fn test_file_name_fallback() {
        assert_eq!(file_name_or("   ", "abc123"), "abc123");
        assert_eq!(file_name_or("..", "abc123"), "abc123");
        assert_eq!(file_name_or("Movie", "abc123"), "Movie");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let long = "é".repeat(200); // 400 bytes
        let truncated = truncate_component(&long, MAX_COMPONENT_LENGTH);
        assert!(truncated.len() <= MAX_COMPONENT_LENGTH);
        assert_eq!(truncated.len(), 254);
    }

    #[test]
    fn test_extension_helpers() {
        assert_eq!(extension_of("video.mp4"), Some("mp4"));
        assert_eq!(extension_of("archive"), None);
        assert_eq!(extension_of("weird.ext with space"), None);

        let renamed = with_missing_extension(Path::new("/tmp/x/job-1"), "mp4");
        assert_eq!(renamed, Some(PathBuf::from("/tmp/x/job-1.mp4")));
        assert_eq!(with_missing_extension(Path::new("/tmp/x/a.ts"), "mp4"), None);
    }
}
