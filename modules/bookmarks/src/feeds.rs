//! RSS/Atom polling: new feed items become unpinned bookmarks.
//!
//! Items are pulled out with regex rather than a full XML parser: RSS
//! `<item>` blocks (`<link>`/`<title>`) and Atom `<entry>` blocks
//! (`<link href>`/`<title>`).

use bookmarks_types::{Feed, FeedPollResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use crate::db::{normalize_url, Db};

static ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>").unwrap());
static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry\b[^>]*>(.*?)</entry>").unwrap());
static LINK_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<link\b[^>]*>(.*?)</link>").unwrap());
static GUID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<guid\b[^>]*>(.*?)</guid>").unwrap());
static ATOM_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<link\b([^>]*?)/?>").unwrap());
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).unwrap());
static REL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"rel\s*=\s*["']([^"']+)["']"#).unwrap());
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").unwrap());

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub url: String,
    pub title: Option<String>,
}

/// Strip a CDATA wrapper and decode the handful of entities feeds actually use
fn clean_text(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(trimmed);

    inner
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

fn capture_text(re: &Regex, block: &str) -> Option<String> {
    re.captures(block)
        .map(|c| clean_text(&c[1]))
        .filter(|s| !s.is_empty())
}

fn atom_link(block: &str) -> Option<String> {
    let mut fallback = None;
    for cap in ATOM_LINK_RE.captures_iter(block) {
        let attrs = &cap[1];
        let Some(href) = HREF_RE.captures(attrs).map(|h| clean_text(&h[1])) else {
            continue;
        };
        match REL_RE.captures(attrs).map(|r| r[1].to_string()) {
            None => return Some(href),
            Some(rel) if rel == "alternate" => return Some(href),
            Some(_) => {
                fallback.get_or_insert(href);
            }
        }
    }
    fallback
}

/// Extract items from an RSS or Atom document. Items without a usable http(s) link are dropped.
pub fn parse_feed(xml: &str) -> Vec<FeedItem> {
    let mut items = Vec::new();

    for cap in ITEM_RE.captures_iter(xml) {
        let block = &cap[1];
        let link = capture_text(&LINK_TEXT_RE, block).or_else(|| capture_text(&GUID_RE, block));
        if let Some(url) = link.and_then(|l| normalize_url(&l).ok()) {
            items.push(FeedItem {
                url,
                title: capture_text(&TITLE_RE, block),
            });
        }
    }

    for cap in ENTRY_RE.captures_iter(xml) {
        let block = &cap[1];
        if let Some(url) = atom_link(block).and_then(|l| normalize_url(&l).ok()) {
            items.push(FeedItem {
                url,
                title: capture_text(&TITLE_RE, block),
            });
        }
    }

    items
}

/// Add every unseen item as a bookmark. Returns (items_seen, bookmarks_added).
pub fn ingest_items(db: &Db, feed: &Feed, items: &[FeedItem], now: DateTime<Utc>) -> Result<(usize, usize), String> {
    let mut added = 0;

    for item in items {
        let ingested = db
            .ingest_feed_item(feed.id, &item.url, item.title.as_deref(), now)
            .map_err(|e| format!("Failed to add feed item {}: {}", item.url, e))?;
        if let Some((_, true)) = ingested {
            added += 1;
        }
    }

    Ok((items.len(), added))
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<String, String> {
    client
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| format!("Request failed: {}", e))?
        .error_for_status()
        .map_err(|e| format!("Feed returned error: {}", e))?
        .text()
        .await
        .map_err(|e| format!("Failed to read feed body: {}", e))
}

/// Fetch one feed and ingest it. Errors are recorded on the feed row, not returned.
pub async fn poll_feed(db: &Db, client: &reqwest::Client, feed: &Feed) -> FeedPollResult {
    let now = Utc::now();
    let outcome = match fetch(client, &feed.url).await {
        Ok(body) => ingest_items(db, feed, &parse_feed(&body), now),
        Err(e) => Err(e),
    };

    let (items_seen, bookmarks_added, error) = match outcome {
        Ok((seen, added)) => (seen, added, None),
        Err(e) => {
            log::warn!("[FEEDS] Poll of {} failed: {}", feed.url, e);
            (0, 0, Some(e))
        }
    };

    if let Err(e) = db.record_poll(feed.id, now, error.as_deref()) {
        log::error!("[FEEDS] Failed to record poll for feed {}: {}", feed.id, e);
    }

    FeedPollResult {
        feed_id: feed.id,
        items_seen,
        bookmarks_added,
        error,
    }
}

/// Poll every feed in turn; one failing feed does not stop the rest
pub async fn poll_all(db: &Db, client: &reqwest::Client) -> Result<Vec<FeedPollResult>, String> {
    let feeds = db.list_feeds().map_err(|e| format!("Failed to list feeds: {}", e))?;
    let mut results = Vec::with_capacity(feeds.len());
    for feed in &feeds {
        results.push(poll_feed(db, client, feed).await);
    }

    let added: usize = results.iter().map(|r| r.bookmarks_added).sum();
    log::info!("[FEEDS] Polled {} feeds, {} new bookmarks", feeds.len(), added);
    Ok(results)
}
