//! STREAM adapter — livestream presence per channel.
//!
//! The status endpoint sits behind bot detection, so fetches go through a
//! `StreamSession`: one browser-like session per cycle, opened before the
//! first fetch and dropped when the group finishes (including on failure).
//! Fetches inside a session are sequential.
//!
//! `HttpStreamBackend` drives the channel API with a cookie-keeping HTTP
//! agent and browser headers. A headless-browser backend plugs in through
//! the same `StreamBackend` trait without touching detection.

use std::time::Duration;

use serde::Deserialize;

use super::{guarded, non_empty, FetchError, FetchRequest, FetchResult, Signal, SourceAdapter, StreamSignal};
use crate::config::StreamConfig;
use crate::subscription::SourceKind;

/// Per-cycle session. Released on drop.
pub trait StreamSession {
    fn fetch(&mut self, username: &str) -> Result<StreamSignal, FetchError>;
}

/// Acquires one session per cycle.
pub trait StreamBackend: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn StreamSession>, FetchError>;
}

pub struct StreamAdapter {
    backend: Box<dyn StreamBackend>,
}

impl StreamAdapter {
    pub fn new(backend: Box<dyn StreamBackend>) -> Self {
        Self { backend }
    }
}

impl SourceAdapter for StreamAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Stream
    }

    fn fetch_group(&self, requests: &[FetchRequest]) -> Result<Vec<FetchResult>, FetchError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let mut session = self.backend.open_session()?;
        tracing::debug!(count = requests.len(), "Stream session opened");

        let results = requests
            .iter()
            .map(|req| guarded(|| session.fetch(&req.source_identity).map(Signal::Stream)))
            .collect();

        drop(session);
        tracing::debug!("Stream session released");
        Ok(results)
    }
}

// ============================================================================
// HTTP BACKEND
// ============================================================================

pub struct HttpStreamBackend {
    api_base: String,
    timeout: Duration,
    user_agent: String,
}

impl HttpStreamBackend {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            user_agent: config.user_agent.clone(),
        }
    }
}

impl StreamBackend for HttpStreamBackend {
    fn open_session(&self) -> Result<Box<dyn StreamSession>, FetchError> {
        if self.api_base.is_empty() {
            return Err(FetchError::Session("stream api_base is empty".into()));
        }
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        Ok(Box::new(HttpStreamSession {
            agent: ureq::Agent::new_with_config(config),
            api_base: self.api_base.clone(),
            user_agent: self.user_agent.clone(),
            fetched: 0,
            failed: 0,
        }))
    }
}

struct HttpStreamSession {
    agent: ureq::Agent,
    api_base: String,
    user_agent: String,
    fetched: u32,
    failed: u32,
}

impl HttpStreamSession {
    fn get(&self, username: &str) -> Result<String, FetchError> {
        let url = format!("{}/{}", self.api_base, username);
        let mut response = self
            .agent
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json")
            .header("Accept-Language", "en-US,en;q=0.9")
            .call()?;
        Ok(response.body_mut().read_to_string()?)
    }
}

impl StreamSession for HttpStreamSession {
    fn fetch(&mut self, username: &str) -> Result<StreamSignal, FetchError> {
        let result = self.get(username).and_then(|body| parse_channel(username, &body));
        match result {
            Ok(_) => self.fetched += 1,
            Err(_) => self.failed += 1,
        }
        result
    }
}

impl Drop for HttpStreamSession {
    fn drop(&mut self) {
        tracing::debug!(fetched = self.fetched, failed = self.failed, "HTTP stream session closed");
    }
}

// ============================================================================
// PAYLOAD
// ============================================================================

#[derive(Deserialize)]
struct ChannelPayload {
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    user: Option<UserPayload>,
    #[serde(default)]
    livestream: Option<LivestreamPayload>,
}

#[derive(Deserialize)]
struct UserPayload {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    profile_pic: Option<String>,
}

#[derive(Deserialize)]
struct LivestreamPayload {
    #[serde(default)]
    session_title: Option<String>,
    #[serde(default)]
    viewer_count: Option<u64>,
    #[serde(default)]
    categories: Vec<CategoryPayload>,
    #[serde(default)]
    thumbnail: Option<ThumbnailPayload>,
}

#[derive(Deserialize)]
struct CategoryPayload {
    name: String,
}

#[derive(Deserialize)]
struct ThumbnailPayload {
    #[serde(default)]
    url: Option<String>,
}

/// Channel status document → signal. A non-null `livestream` means live.
pub fn parse_channel(username: &str, body: &str) -> Result<StreamSignal, FetchError> {
    let payload: ChannelPayload = serde_json::from_str(body)?;
    let user = payload.user;
    if user.is_none() && payload.slug.is_none() {
        return Err(FetchError::NotFound(username.to_string()));
    }
    let display = user
        .as_ref()
        .and_then(|u| u.username.clone())
        .unwrap_or_else(|| username.to_string());
    let profile_pic = non_empty(user.and_then(|u| u.profile_pic));
    let slug = payload.slug.unwrap_or_else(|| username.to_string());

    let mut signal = StreamSignal {
        url: format!("https://kick.com/{}", slug),
        username: display,
        profile_pic,
        ..Default::default()
    };
    if let Some(live) = payload.livestream {
        signal.live = true;
        signal.title = non_empty(live.session_title);
        signal.viewers = live.viewer_count;
        signal.category = live.categories.into_iter().next().map(|c| c.name);
        signal.thumbnail = non_empty(live.thumbnail.and_then(|t| t.url));
    }
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeStreamBackend;
    use std::sync::atomic::Ordering;

    const LIVE: &str = r#"{
        "slug": "trainwreckstv",
        "user": {"username": "Trainwreckstv", "profile_pic": "https://img.example/p.png"},
        "livestream": {
            "session_title": "late night slots",
            "viewer_count": 12034,
            "categories": [{"name": "Slots & Casino"}, {"name": "Just Chatting"}],
            "thumbnail": {"url": "https://img.example/t.jpg"}
        }
    }"#;

    #[test]
    fn test_parse_live_channel() {
        let s = parse_channel("trainwreckstv", LIVE).unwrap();
        assert!(s.live);
        assert_eq!(s.username, "Trainwreckstv");
        assert_eq!(s.title.as_deref(), Some("late night slots"));
        assert_eq!(s.viewers, Some(12034));
        assert_eq!(s.category.as_deref(), Some("Slots & Casino"));
        assert_eq!(s.thumbnail.as_deref(), Some("https://img.example/t.jpg"));
        assert_eq!(s.url, "https://kick.com/trainwreckstv");
    }

    #[test]
    fn test_parse_offline_channel() {
        let s = parse_channel(
            "quiet",
            r#"{"slug":"quiet","user":{"username":"Quiet","profile_pic":""},"livestream":null}"#,
        )
        .unwrap();
        assert!(!s.live);
        assert!(s.title.is_none());
        assert!(s.profile_pic.is_none());
    }

    #[test]
    fn test_parse_rejects_garbage_and_unknown() {
        assert!(matches!(parse_channel("x", "<html>challenge</html>"), Err(FetchError::Parse(_))));
        assert!(matches!(parse_channel("x", "{}"), Err(FetchError::NotFound(_))));
    }

    #[test]
    fn test_group_uses_one_session_and_releases_it() {
        let backend = FakeStreamBackend::new()
            .live("a", true)
            .failing("b")
            .live("c", false);
        let opened = backend.opened.clone();
        let released = backend.released.clone();
        let adapter = StreamAdapter::new(Box::new(backend));

        let requests: Vec<FetchRequest> = ["a", "b", "c"]
            .iter()
            .map(|u| FetchRequest {
                subscription_id: u.to_string(),
                source_identity: u.to_string(),
                since: None,
            })
            .collect();
        let results = adapter.fetch_group(&requests).unwrap();

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(matches!(&results[0], Ok(Signal::Stream(s)) if s.live));
        assert!(results[1].is_err());
        assert!(matches!(&results[2], Ok(Signal::Stream(s)) if !s.live));
    }

    #[test]
    fn test_session_failure_aborts_group() {
        let adapter = StreamAdapter::new(Box::new(FakeStreamBackend::new().unavailable()));
        let req = FetchRequest {
            subscription_id: "a".into(),
            source_identity: "a".into(),
            since: None,
        };
        assert!(matches!(adapter.fetch_group(&[req]), Err(FetchError::Session(_))));
    }
}
