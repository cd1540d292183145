//! Parse note frontmatter and body metadata.
//!
//! Hand-rolled YAML subset (no serde_yaml): `key: value` pairs, inline lists
//! `[a, b]` and block lists (`- a` lines under a key). Also resolves a
//! display title and collects #tags from the body.

use regex::Regex;
use std::sync::LazyLock;

use super::links::{extract_links, unfenced_lines};

/// Parsed note frontmatter
#[derive(Debug, Clone, Default)]
pub struct NoteFrontmatter {
    pub title: String,
    pub tags: Vec<String>,
}

/// A fully parsed note (frontmatter + body)
#[derive(Debug, Clone)]
pub struct ParsedNote {
    pub frontmatter: NoteFrontmatter,
    pub body: String,
    /// `[[id]]` targets from the body
    pub links: Vec<String>,
    /// Frontmatter tags merged with #inline-tags, deduplicated case-insensitively
    pub all_tags: Vec<String>,
}

impl ParsedNote {
    /// Display title: frontmatter title, then first `# ` heading, then the fallback (the note id)
    pub fn title_or(&self, fallback: &str) -> String {
        if !self.frontmatter.title.is_empty() {
            return self.frontmatter.title.clone();
        }
        first_heading(&self.body).unwrap_or_else(|| fallback.to_string())
    }

    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

static INLINE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)#([a-zA-Z][a-zA-Z0-9_/-]*)").unwrap());

/// Parse a complete note file (frontmatter + body)
pub fn parse_note(content: &str) -> ParsedNote {
    let (frontmatter, body) = split_frontmatter(content);
    let fm = parse_frontmatter(&frontmatter);

    let links = extract_links(&body);
    let inline_tags = extract_inline_tags(&body);

    let mut all_tags: Vec<String> = Vec::new();
    for tag in fm.tags.iter().chain(inline_tags.iter()) {
        let lower = tag.to_lowercase();
        if !all_tags.iter().any(|t| t.to_lowercase() == lower) {
            all_tags.push(tag.clone());
        }
    }

    ParsedNote {
        frontmatter: fm,
        body,
        links,
        all_tags,
    }
}

/// Split content into (frontmatter_yaml, body). Returns empty frontmatter if none found.
fn split_frontmatter(content: &str) -> (String, String) {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return (String::new(), content.to_string());
    }

    let after_open = &trimmed[3..];
    if let Some(close_idx) = after_open.find("\n---") {
        let yaml = after_open[..close_idx].trim().to_string();
        let body_start = close_idx + 4; // skip \n---
        let body = if body_start < after_open.len() {
            after_open[body_start..].trim_start_matches('\n').to_string()
        } else {
            String::new()
        };
        (yaml, body)
    } else {
        (String::new(), content.to_string())
    }
}

fn parse_frontmatter(yaml: &str) -> NoteFrontmatter {
    let mut fm = NoteFrontmatter::default();
    // Key whose block list (`- item` lines) we are currently reading
    let mut list_key: Option<String> = None;

    for line in yaml.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            let item = unquote(item);
            if list_key.as_deref() == Some("tags") && !item.is_empty() {
                fm.tags.push(item);
            }
            continue;
        }

        list_key = None;
        if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim();
            let value = value.trim();

            match key {
                "title" => fm.title = unquote(value),
                "tags" => {
                    fm.tags = if value.is_empty() {
                        list_key = Some(key.to_string());
                        Vec::new()
                    } else if value.starts_with('[') {
                        parse_inline_list(value)
                    } else {
                        // `tags: a, b` or a single bare value
                        value
                            .split(',')
                            .map(|v| unquote(v.trim()))
                            .filter(|v| !v.is_empty())
                            .collect()
                    };
                }
                // Other keys, including their block lists, are ignored
                _ => list_key = Some(key.to_string()),
            }
        }
    }

    fm
}

/// First level-one markdown heading in the body, outside code fences
pub fn first_heading(body: &str) -> Option<String> {
    for line in unfenced_lines(body) {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("# ") {
            let heading = heading.trim();
            if !heading.is_empty() {
                return Some(heading.to_string());
            }
        }
    }
    None
}

/// Extract #inline-tags from text, outside code fences
pub fn extract_inline_tags(text: &str) -> Vec<String> {
    unfenced_lines(text)
        .flat_map(|line| INLINE_TAG_RE.captures_iter(line))
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Remove surrounding quotes from a string
fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Parse an inline YAML list like [foo, bar, "baz qux"]
fn parse_inline_list(s: &str) -> Vec<String> {
    let s = s.trim();
    let inner = if s.starts_with('[') && s.ends_with(']') {
        &s[1..s.len() - 1]
    } else {
        s
    };

    inner
        .split(',')
        .map(|item| unquote(item.trim()))
        .filter(|item| !item.is_empty())
        .collect()
}
