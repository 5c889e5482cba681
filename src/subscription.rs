//! Subscription model — the unit of tracking.
//!
//! A subscription ties one source (stream username, feed URL or timeline
//! handle) to one destination. Its `marker` is the durable cursor of what was
//! last observed; only the scheduler writes it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{YOUTUBE_CHANNEL_PREFIX, YOUTUBE_FEED_BASE};
use crate::error::{WatchError, WatchResult};
use crate::id_gen;

/// Source category. Determines which adapter and detector rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Stream,
    Feed,
    Timeline,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Stream, SourceKind::Feed, SourceKind::Timeline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Feed => "feed",
            Self::Timeline => "timeline",
        }
    }

    /// Marker a freshly added subscription starts with.
    /// Streams start offline; item-based kinds start "never checked".
    pub fn initial_marker(&self) -> Option<Marker> {
        match self {
            Self::Stream => Some(Marker::Live(false)),
            Self::Feed | Self::Timeline => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" | "kick" => Ok(Self::Stream),
            "feed" | "rss" | "youtube" => Ok(Self::Feed),
            "timeline" | "twitter" => Ok(Self::Timeline),
            other => Err(WatchError::InvalidInput(format!("unknown source kind: {}", other))),
        }
    }
}

/// What was last observed for a subscription.
///
/// Serialized untagged: `true`/`false` for streams, a string id otherwise.
/// An absent marker (`null`) means "never checked".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Marker {
    Live(bool),
    Item(String),
}

impl Marker {
    pub fn is_live(&self) -> bool {
        matches!(self, Marker::Live(true))
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            Marker::Item(id) => Some(id),
            Marker::Live(_) => None,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Live(true) => f.write_str("live"),
            Marker::Live(false) => f.write_str("offline"),
            Marker::Item(id) => f.write_str(id),
        }
    }
}

/// Optional gate between detection and emission.
/// Empty lists mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_viewers: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl SubscriptionFilter {
    pub fn is_empty(&self) -> bool {
        self.min_viewers.is_none() && self.categories.is_empty() && self.keywords.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub kind: SourceKind,
    /// Username, feed URL or handle.
    pub source_identity: String,
    /// Opaque destination reference (channel id, webhook URL).
    pub destination: String,
    /// Grouping key. Absent on legacy records: globally visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_scope: Option<String>,
    #[serde(default, deserialize_with = "lenient_marker")]
    pub marker: Option<Marker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<SubscriptionFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A marker of the wrong shape reads as "never checked" instead of
/// rejecting the whole record.
fn lenient_marker<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Marker>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value::<Marker>(value.clone()) {
        Ok(marker) => Some(marker),
        Err(_) => {
            tracing::warn!(marker = %value, "Unreadable marker, treating as never checked");
            None
        }
    }))
}

impl Subscription {
    /// Uniqueness key among active subscriptions.
    pub fn same_target(&self, kind: SourceKind, identity: &str, destination: &str) -> bool {
        self.kind == kind && self.source_identity == identity && self.destination == destination
    }

    /// `None` scope lists everything. A scoped listing also includes
    /// records created before scopes existed.
    pub fn visible_to(&self, scope: Option<&str>) -> bool {
        match (scope, self.owner_scope.as_deref()) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(wanted), Some(owner)) => wanted == owner,
        }
    }
}

/// Add request as accepted from the command surface.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub kind: SourceKind,
    pub source_identity: String,
    pub destination: String,
    pub owner_scope: Option<String>,
    pub filter: Option<SubscriptionFilter>,
}

impl NewSubscription {
    /// Stream usernames are case-insensitive upstream; stored lower-cased.
    pub fn stream(username: &str, destination: &str) -> WatchResult<Self> {
        let username = username.trim().to_lowercase();
        if username.is_empty() || username.contains(['/', '?', '#', ' ']) {
            return Err(WatchError::InvalidInput(format!(
                "invalid stream username: '{}'",
                username
            )));
        }
        Self::build(SourceKind::Stream, username, destination)
    }

    pub fn feed(url: &str, destination: &str) -> WatchResult<Self> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(WatchError::InvalidInput(format!(
                "feed URL must be http(s): '{}'",
                url
            )));
        }
        Self::build(SourceKind::Feed, url.to_string(), destination)
    }

    /// YouTube channel, tracked through its public Atom feed.
    pub fn youtube(channel_id: &str, destination: &str) -> WatchResult<Self> {
        let channel_id = channel_id.trim();
        if !channel_id.starts_with(YOUTUBE_CHANNEL_PREFIX) || channel_id.len() <= 2 {
            return Err(WatchError::InvalidInput(format!(
                "YouTube channel id must start with '{}': '{}'",
                YOUTUBE_CHANNEL_PREFIX, channel_id
            )));
        }
        Self::build(
            SourceKind::Feed,
            format!("{}{}", YOUTUBE_FEED_BASE, channel_id),
            destination,
        )
    }

    pub fn timeline(handle: &str, destination: &str) -> WatchResult<Self> {
        let handle = handle.trim().trim_start_matches('@');
        if handle.is_empty() || !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(WatchError::InvalidInput(format!("invalid handle: '{}'", handle)));
        }
        Self::build(SourceKind::Timeline, handle.to_string(), destination)
    }

    fn build(kind: SourceKind, source_identity: String, destination: &str) -> WatchResult<Self> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(WatchError::InvalidInput("destination is required".into()));
        }
        Ok(Self {
            kind,
            source_identity,
            destination: destination.to_string(),
            owner_scope: None,
            filter: None,
        })
    }

    pub fn with_scope(mut self, scope: Option<&str>) -> Self {
        self.owner_scope = scope.filter(|s| !s.is_empty()).map(str::to_string);
        self
    }

    pub fn with_filter(mut self, filter: SubscriptionFilter) -> Self {
        self.filter = if filter.is_empty() { None } else { Some(filter) };
        self
    }

    pub fn into_subscription(self) -> Subscription {
        Subscription {
            id: id_gen::subscription_id(self.kind, &self.source_identity, &self.destination),
            marker: self.kind.initial_marker(),
            kind: self.kind,
            source_identity: self.source_identity,
            destination: self.destination,
            owner_scope: self.owner_scope,
            filter: self.filter,
            created_at: Some(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_serializes_untagged() {
        assert_eq!(serde_json::to_string(&Marker::Live(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Marker::Item("abc".into())).unwrap(), "\"abc\"");
        let m: Marker = serde_json::from_str("false").unwrap();
        assert_eq!(m, Marker::Live(false));
        let m: Marker = serde_json::from_str("\"yt:video:1\"").unwrap();
        assert_eq!(m.item_id(), Some("yt:video:1"));
    }

    #[test]
    fn test_initial_markers() {
        let s = NewSubscription::stream("XQC", "123").unwrap().into_subscription();
        assert_eq!(s.source_identity, "xqc");
        assert_eq!(s.marker, Some(Marker::Live(false)));

        let f = NewSubscription::feed("https://blog.example/rss", "123").unwrap().into_subscription();
        assert_eq!(f.marker, None);
    }

    #[test]
    fn test_youtube_builds_feed_url() {
        let n = NewSubscription::youtube("UCabc123", "9").unwrap();
        assert_eq!(n.kind, SourceKind::Feed);
        assert_eq!(
            n.source_identity,
            "https://www.youtube.com/feeds/videos.xml?channel_id=UCabc123"
        );
        assert!(NewSubscription::youtube("abc123", "9").is_err());
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(NewSubscription::feed("ftp://x", "1").is_err());
        assert!(NewSubscription::stream("", "1").is_err());
        assert!(NewSubscription::timeline("@bad handle", "1").is_err());
        assert!(NewSubscription::stream("ok", "  ").is_err());
        assert_eq!(NewSubscription::timeline("@rustlang", "1").unwrap().source_identity, "rustlang");
    }

    #[test]
    fn test_visibility_includes_legacy_records() {
        let mut s = NewSubscription::feed("https://a.example/feed", "1")
            .unwrap()
            .with_scope(Some("guild-1"))
            .into_subscription();
        assert!(s.visible_to(None));
        assert!(s.visible_to(Some("guild-1")));
        assert!(!s.visible_to(Some("guild-2")));

        s.owner_scope = None;
        assert!(s.visible_to(Some("guild-2")));
    }

    #[test]
    fn test_kind_parses_legacy_names() {
        assert_eq!("kick".parse::<SourceKind>().unwrap(), SourceKind::Stream);
        assert_eq!("YouTube".parse::<SourceKind>().unwrap(), SourceKind::Feed);
        assert!("podcast".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_empty_filter_is_dropped() {
        let n = NewSubscription::stream("a", "1")
            .unwrap()
            .with_filter(SubscriptionFilter::default());
        assert!(n.filter.is_none());
    }
}
