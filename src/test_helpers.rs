//! Shared test utilities — subscription builder and in-memory sources.
//!
//! Available only under `#[cfg(test)]`. Every fake is `Clone` and shares its
//! state, so a test can keep a handle and change what the "network" returns
//! between scheduler cycles.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{WatchError, WatchResult};
use crate::notify::{Change, Notifier};
use crate::sources::{
    FeedEntry, FeedSignal, FeedSource, FetchError, StreamBackend, StreamSession, StreamSignal,
    TimelineItem, TimelineSignal, TimelineSource,
};
use crate::subscription::{Marker, NewSubscription, Subscription, SubscriptionFilter};

// ============================================================================
// SubscriptionBuilder
// ============================================================================

pub struct SubscriptionBuilder {
    sub: Subscription,
}

impl SubscriptionBuilder {
    pub fn stream(username: &str) -> Self {
        Self::from_new(NewSubscription::stream(username, "test-channel").unwrap())
    }

    pub fn feed(url: &str) -> Self {
        Self::from_new(NewSubscription::feed(url, "test-channel").unwrap())
    }

    pub fn timeline(handle: &str) -> Self {
        Self::from_new(NewSubscription::timeline(handle, "test-channel").unwrap())
    }

    fn from_new(new: NewSubscription) -> Self {
        Self {
            sub: new.into_subscription(),
        }
    }

    /// Last-seen item id.
    pub fn marker(mut self, id: &str) -> Self {
        self.sub.marker = Some(Marker::Item(id.to_string()));
        self
    }

    pub fn live(mut self, live: bool) -> Self {
        self.sub.marker = Some(Marker::Live(live));
        self
    }

    pub fn filter(mut self, filter: SubscriptionFilter) -> Self {
        self.sub.filter = Some(filter);
        self
    }

    pub fn build(self) -> Subscription {
        self.sub
    }
}

// ============================================================================
// FakeStreamBackend
// ============================================================================

#[derive(Default)]
struct StreamState {
    live: HashMap<String, bool>,
    failing: HashSet<String>,
    unavailable: bool,
}

/// Counts opened and released sessions.
#[derive(Clone, Default)]
pub struct FakeStreamBackend {
    state: Arc<Mutex<StreamState>>,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl FakeStreamBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(self, username: &str, live: bool) -> Self {
        self.set_live(username, live);
        self
    }

    pub fn failing(self, username: &str) -> Self {
        self.state.lock().unwrap().failing.insert(username.to_string());
        self
    }

    pub fn unavailable(self) -> Self {
        self.set_unavailable(true);
        self
    }

    pub fn set_live(&self, username: &str, live: bool) {
        self.state.lock().unwrap().live.insert(username.to_string(), live);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }
}

impl StreamBackend for FakeStreamBackend {
    fn open_session(&self) -> Result<Box<dyn StreamSession>, FetchError> {
        if self.state.lock().unwrap().unavailable {
            return Err(FetchError::Session("browser failed to launch".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStreamSession {
            state: self.state.clone(),
            released: self.released.clone(),
        }))
    }
}

struct FakeStreamSession {
    state: Arc<Mutex<StreamState>>,
    released: Arc<AtomicUsize>,
}

impl StreamSession for FakeStreamSession {
    fn fetch(&mut self, username: &str) -> Result<StreamSignal, FetchError> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(username) {
            return Err(FetchError::Status(403));
        }
        let live = state.live.get(username).copied().unwrap_or(false);
        Ok(StreamSignal {
            username: username.to_string(),
            live,
            url: format!("https://kick.com/{}", username),
            title: live.then(|| "Test stream".to_string()),
            viewers: live.then_some(250),
            category: live.then(|| "Just Chatting".to_string()),
            ..Default::default()
        })
    }
}

impl Drop for FakeStreamSession {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// FakeFeed
// ============================================================================

#[derive(Default)]
struct FeedState {
    entries: HashMap<String, String>,
    failing: HashSet<String>,
}

/// Latest entry id per URL. Unknown URLs are empty feeds.
#[derive(Clone, Default)]
pub struct FakeFeed {
    state: Arc<Mutex<FeedState>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(self, url: &str, id: &str) -> Self {
        self.set_entry(url, id);
        self
    }

    pub fn failing(self, url: &str) -> Self {
        self.set_failing(url);
        self
    }

    pub fn set_entry(&self, url: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing.remove(url);
        state.entries.insert(url.to_string(), id.to_string());
    }

    pub fn set_failing(&self, url: &str) {
        self.state.lock().unwrap().failing.insert(url.to_string());
    }
}

impl FeedSource for FakeFeed {
    fn fetch(&self, url: &str) -> Result<FeedSignal, FetchError> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(url) {
            return Err(FetchError::Status(503));
        }
        Ok(FeedSignal {
            feed_title: Some("Fake feed".to_string()),
            latest: state.entries.get(url).map(|id| FeedEntry {
                id: id.clone(),
                title: Some(format!("Entry {}", id)),
                link: Some(format!("{}#{}", url, id)),
                ..Default::default()
            }),
        })
    }
}

// ============================================================================
// FakeTimeline
// ============================================================================

struct TimelineState {
    posts: HashMap<String, Vec<String>>,
    available: bool,
}

/// Numeric post ids per handle, oldest first.
#[derive(Clone)]
pub struct FakeTimeline {
    state: Arc<Mutex<TimelineState>>,
}

impl FakeTimeline {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TimelineState {
                posts: HashMap::new(),
                available: true,
            })),
        }
    }

    pub fn posts(self, handle: &str, ids: &[&str]) -> Self {
        for id in ids {
            self.push_post(handle, id);
        }
        self
    }

    pub fn push_post(&self, handle: &str, id: &str) {
        self.state
            .lock()
            .unwrap()
            .posts
            .entry(handle.to_string())
            .or_default()
            .push(id.to_string());
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().unwrap().available = available;
    }
}

impl TimelineSource for FakeTimeline {
    fn is_available(&self) -> bool {
        self.state.lock().unwrap().available
    }

    fn fetch(&self, handle: &str, since: Option<&str>) -> Result<TimelineSignal, FetchError> {
        let state = self.state.lock().unwrap();
        let since: Option<u64> = since.and_then(|s| s.parse().ok());
        let items = state
            .posts
            .get(handle)
            .map(|ids| {
                ids.iter()
                    .filter(|id| match (since, id.parse::<u64>()) {
                        (Some(s), Ok(n)) => n > s,
                        _ => true,
                    })
                    .map(|id| TimelineItem {
                        id: id.clone(),
                        text: format!("post {}", id),
                        url: format!("https://x.com/{}/status/{}", handle, id),
                        created_at: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(TimelineSignal {
            handle: handle.to_string(),
            items,
        })
    }
}

// ============================================================================
// RecordingNotifier
// ============================================================================

/// Records the subscription id of every delivered change.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    delivered: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, change: &Change<'_>) -> WatchResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WatchError::Notify("destination unreachable".into()));
        }
        self.delivered.lock().unwrap().push(change.subscription.id.clone());
        Ok(())
    }
}
