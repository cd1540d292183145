//! `[[id]]` link extraction.
//!
//! A link target is the text between the brackets up to the first `|`
//! (display label) or `#` (heading anchor), trimmed. Targets inside fenced
//! code blocks are ignored.

use regex::Regex;
use std::sync::LazyLock;

static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap());

/// Lines of `text` outside fenced code blocks. A fence closes only on the
/// marker that opened it; an unclosed fence runs to the end.
pub fn unfenced_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut fence: Option<&str> = None;
    text.lines().filter(move |line| {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };

        match (fence, marker) {
            (None, Some(m)) => {
                fence = Some(m);
                false
            }
            (Some(open), Some(m)) if open == m => {
                fence = None;
                false
            }
            (Some(_), _) => false,
            (None, None) => true,
        }
    })
}

/// Extract link targets in order of first appearance, without duplicates
pub fn extract_links(text: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for line in unfenced_lines(text) {
        for cap in WIKILINK_RE.captures_iter(line) {
            if let Some(target) = normalize_target(&cap[1]) {
                if !links.contains(&target) {
                    links.push(target);
                }
            }
        }
    }
    links
}

/// Reduce raw bracket content to the note id it points at
pub fn normalize_target(raw: &str) -> Option<String> {
    let target = raw.split(['|', '#']).next().unwrap_or("").trim();
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_links_basic() {
        let text = "See [[202401011200]] and [[zettel-b]] for details.";
        assert_eq!(extract_links(text), vec!["202401011200", "zettel-b"]);
    }

    #[test]
    fn test_extract_links_label_and_anchor() {
        let text = "[[a1|the first note]], [[b2#Section]] and [[ c3 ]]";
        assert_eq!(extract_links(text), vec!["a1", "b2", "c3"]);
    }

    #[test]
    fn test_extract_links_dedup_keeps_first_position() {
        let text = "[[b]] then [[a]] then [[b|again]]";
        assert_eq!(extract_links(text), vec!["b", "a"]);
    }

    #[test]
    fn test_extract_links_skips_fenced_code() {
        let text = "[[real]]\n```\n[[in-code]]\n```\nafter [[also-real]]\n~~~md\n[[tilde]]\n~~~\n";
        assert_eq!(extract_links(text), vec!["real", "also-real"]);
    }

    #[test]
    fn test_extract_links_unclosed_fence_swallows_rest() {
        let text = "[[before]]\n```\n[[never]]";
        assert_eq!(extract_links(text), vec!["before"]);
    }

    #[test]
    fn test_extract_links_ignores_empty_and_malformed() {
        let text = "[[]] [[ | label]] [[#only-anchor]] [single] [[unclosed";
        assert!(extract_links(text).is_empty());
    }

    #[test]
    fn test_extract_links_allows_open_bracket_in_target() {
        assert_eq!(extract_links("see [[a[b]] here"), vec!["a[b"]);
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("id|label").as_deref(), Some("id"));
        assert_eq!(normalize_target("  spaced id  ").as_deref(), Some("spaced id"));
        assert_eq!(normalize_target("|x"), None);
    }
}
