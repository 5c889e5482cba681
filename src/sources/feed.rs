//! FEED adapter — RSS/Atom documents over HTTP.
//!
//! Only the most recent entry matters: its id (link as fallback), title,
//! link, author, categories and a best-effort image. Image lookup prefers
//! media thumbnails and falls back to the first `<img src>` in the summary.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use super::{non_empty, BoundedPool, FeedEntry, FeedSignal, FetchError, FetchRequest, FetchResult, Signal, SourceAdapter};
use crate::config::FeedConfig;
use crate::subscription::SourceKind;

pub trait FeedSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FeedSignal, FetchError>;
}

pub struct FeedAdapter {
    source: Box<dyn FeedSource>,
    pool: BoundedPool,
}

impl FeedAdapter {
    pub fn new(source: Box<dyn FeedSource>, max_parallel: usize) -> Self {
        Self {
            source,
            pool: BoundedPool::new("feed", max_parallel),
        }
    }
}

impl SourceAdapter for FeedAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Feed
    }

    fn fetch_group(&self, requests: &[FetchRequest]) -> Result<Vec<FetchResult>, FetchError> {
        Ok(self
            .pool
            .map(requests, |req| self.source.fetch(&req.source_identity).map(Signal::Feed)))
    }
}

pub struct HttpFeedSource {
    agent: ureq::Agent,
}

impl HttpFeedSource {
    pub fn new(config: &FeedConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
        }
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch(&self, url: &str) -> Result<FeedSignal, FetchError> {
        let mut response = self
            .agent
            .get(url)
            .header("Accept", "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8")
            .call()?;
        let body = response.body_mut().read_to_vec()?;
        parse_feed(&body)
    }
}

/// Parse a syndication document and keep its first (most recent) entry.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedSignal, FetchError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
    let feed_title = non_empty(feed.title.map(|t| t.content));
    let latest = feed.entries.into_iter().next().and_then(entry_from);
    Ok(FeedSignal { feed_title, latest })
}

fn entry_from(entry: feed_rs::model::Entry) -> Option<FeedEntry> {
    let link = entry.links.first().map(|l| l.href.clone()).filter(|h| !h.is_empty());
    let id = non_empty(Some(entry.id)).or_else(|| link.clone())?;

    let image = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .find(|u| !u.is_empty())
        .or_else(|| {
            entry
                .summary
                .as_ref()
                .and_then(|s| first_img_src(&s.content))
                .or_else(|| {
                    entry
                        .content
                        .as_ref()
                        .and_then(|c| c.body.as_deref())
                        .and_then(first_img_src)
                })
        });

    Some(FeedEntry {
        id,
        title: non_empty(entry.title.map(|t| t.content)),
        link,
        author: entry.authors.into_iter().map(|p| p.name).find(|n| !n.trim().is_empty()),
        categories: entry.categories.into_iter().map(|c| c.term).collect(),
        image,
        published: entry.published.or(entry.updated),
    })
}

fn img_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<img[^>]+src=["']([^"'>]+)["']"#).unwrap())
}

/// First image reference in an HTML fragment.
pub fn first_img_src(html: &str) -> Option<String> {
    img_regex()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
