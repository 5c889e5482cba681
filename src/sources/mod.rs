//! Source adapters — one per `SourceKind`, behind a common capability.
//!
//! Each adapter turns a batch of fetch requests for its kind into one
//! `Signal` (or `FetchError`) per request. How it gets there (shared browser
//! session, parallel HTTP, credentialed API) stays inside the adapter; the
//! scheduler only sees `SourceAdapter::fetch_group`.
//!
//! A group-level `Err` means the cycle-scoped resource for that kind could not
//! be acquired: the whole group is skipped for this cycle, other kinds are not.

pub mod feed;
pub mod stream;
pub mod timeline;

use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::WatcherConfig;
use crate::subscription::{SourceKind, Subscription};

pub use feed::{FeedAdapter, FeedSource, HttpFeedSource};
pub use stream::{HttpStreamBackend, StreamAdapter, StreamBackend, StreamSession};
pub use timeline::{HttpTimelineSource, TimelineAdapter, TimelineSource};

// ============================================================================
// SIGNALS
// ============================================================================

/// Current livestream presence for one channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamSignal {
    pub username: String,
    pub live: bool,
    pub url: String,
    pub title: Option<String>,
    pub viewers: Option<u64>,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    pub profile_pic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedEntry {
    /// Stable entry id, or the link when the document has none.
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub image: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// Most recent entry of a syndication document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedSignal {
    pub feed_title: Option<String>,
    pub latest: Option<FeedEntry>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimelineItem {
    pub id: String,
    pub text: String,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Items newer than the last-seen id, oldest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimelineSignal {
    pub handle: String,
    pub items: Vec<TimelineItem>,
}

impl TimelineSignal {
    pub fn latest(&self) -> Option<&TimelineItem> {
        self.items.last()
    }
}

/// Fresh snapshot of a source, not yet compared against the marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Stream(StreamSignal),
    Feed(FeedSignal),
    Timeline(TimelineSignal),
    /// Adapter is configured off (e.g. missing credential).
    NoData,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Fetch panicked: {0}")]
    Panicked(String),
}

impl From<ureq::Error> for FetchError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(code) => FetchError::Status(code),
            ureq::Error::Timeout(_) => FetchError::Timeout,
            other => FetchError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Parse(e.to_string())
    }
}

// ============================================================================
// CAPABILITY
// ============================================================================

/// One fetch to perform in a cycle.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub subscription_id: String,
    pub source_identity: String,
    /// Last-seen item id, for sources that page by cursor.
    pub since: Option<String>,
}

impl From<&Subscription> for FetchRequest {
    fn from(sub: &Subscription) -> Self {
        Self {
            subscription_id: sub.id.clone(),
            source_identity: sub.source_identity.clone(),
            since: sub.marker.as_ref().and_then(|m| m.item_id()).map(str::to_string),
        }
    }
}

pub type FetchResult = Result<Signal, FetchError>;

pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// One result per request, in request order.
    fn fetch_group(&self, requests: &[FetchRequest]) -> Result<Vec<FetchResult>, FetchError>;
}

/// The adapter set for one scheduler. One field per kind.
pub struct Adapters {
    pub stream: StreamAdapter,
    pub feed: FeedAdapter,
    pub timeline: TimelineAdapter,
}

impl Adapters {
    pub fn new(stream: StreamAdapter, feed: FeedAdapter, timeline: TimelineAdapter) -> Self {
        Self { stream, feed, timeline }
    }

    /// Production adapters over HTTP.
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            stream: StreamAdapter::new(Box::new(HttpStreamBackend::new(&config.stream))),
            feed: FeedAdapter::new(
                Box::new(HttpFeedSource::new(&config.feed)),
                config.feed.max_parallel,
            ),
            timeline: TimelineAdapter::new(
                Box::new(HttpTimelineSource::new(&config.timeline)),
                config.timeline.max_parallel,
            ),
        }
    }

    pub fn for_kind(&self, kind: SourceKind) -> &dyn SourceAdapter {
        match kind {
            SourceKind::Stream => &self.stream,
            SourceKind::Feed => &self.feed,
            SourceKind::Timeline => &self.timeline,
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Run one fetch with panic isolation: a panicking fetch becomes a
/// `FetchError` for that request only.
pub(crate) fn guarded(f: impl FnOnce() -> FetchResult) -> FetchResult {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(FetchError::Panicked(msg))
        }
    }
}

/// Bounded fan-out for network-bound kinds.
/// Falls back to sequential fetches if the pool cannot be built.
pub(crate) struct BoundedPool {
    pool: Option<rayon::ThreadPool>,
}

impl BoundedPool {
    pub(crate) fn new(name: &'static str, max_parallel: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_parallel.max(1))
            .thread_name(move |i| format!("{}-fetch-{}", name, i))
            .build();
        match pool {
            Ok(pool) => Self { pool: Some(pool) },
            Err(e) => {
                tracing::warn!(kind = name, error = %e, "Fetch pool unavailable, fetching sequentially");
                Self { pool: None }
            }
        }
    }

    pub(crate) fn map<F>(&self, requests: &[FetchRequest], f: F) -> Vec<FetchResult>
    where
        F: Fn(&FetchRequest) -> FetchResult + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| {
                requests.par_iter().map(|r| guarded(|| f(r))).collect()
            }),
            None => requests.iter().map(|r| guarded(|| f(r))).collect(),
        }
    }
}

/// First non-empty trimmed string.
pub(crate) fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{Marker, NewSubscription};

    #[test]
    fn test_fetch_request_carries_item_cursor_only() {
        let mut sub = NewSubscription::timeline("rustlang", "1").unwrap().into_subscription();
        assert_eq!(FetchRequest::from(&sub).since, None);
        sub.marker = Some(Marker::Item("1790".into()));
        assert_eq!(FetchRequest::from(&sub).since.as_deref(), Some("1790"));

        let stream = NewSubscription::stream("a", "1").unwrap().into_subscription();
        assert_eq!(FetchRequest::from(&stream).since, None);
    }

    #[test]
    fn test_for_kind_routes_to_matching_adapter() {
        use crate::test_helpers::{FakeFeed, FakeStreamBackend, FakeTimeline};

        let adapters = Adapters::new(
            StreamAdapter::new(Box::new(FakeStreamBackend::new())),
            FeedAdapter::new(Box::new(FakeFeed::new()), 1),
            TimelineAdapter::new(Box::new(FakeTimeline::new()), 1),
        );
        for kind in SourceKind::ALL {
            assert_eq!(adapters.for_kind(kind).kind(), kind);
        }
    }

    #[test]
    fn test_guarded_converts_panic() {
        let r = guarded(|| panic!("boom"));
        assert_eq!(r, Err(FetchError::Panicked("boom".into())));
    }

    #[test]
    fn test_bounded_pool_preserves_order_and_isolates() {
        let pool = BoundedPool::new("test", 3);
        let requests: Vec<FetchRequest> = (0..6)
            .map(|i| FetchRequest {
                subscription_id: i.to_string(),
                source_identity: i.to_string(),
                since: None,
            })
            .collect();
        let results = pool.map(&requests, |r| {
            if r.source_identity == "2" {
                panic!("bad source");
            }
            Ok(Signal::Timeline(TimelineSignal {
                handle: r.source_identity.clone(),
                items: vec![],
            }))
        });
        assert_eq!(results.len(), 6);
        assert!(matches!(results[2], Err(FetchError::Panicked(_))));
        for (i, r) in results.iter().enumerate().filter(|(i, _)| *i != 2) {
            match r {
                Ok(Signal::Timeline(t)) => assert_eq!(t.handle, i.to_string()),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
