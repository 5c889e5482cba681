//! TIMELINE adapter — recent posts of a handle via the v2 REST API.
//!
//! Optional by nature: without a bearer token the adapter answers
//! `Signal::NoData` for every request and never touches the network.
//! Handle → user id lookups are cached for the life of the process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{BoundedPool, FetchError, FetchRequest, FetchResult, Signal, SourceAdapter, TimelineItem, TimelineSignal};
use crate::config::TimelineConfig;
use crate::subscription::SourceKind;

pub trait TimelineSource: Send + Sync {
    /// False when the credential is missing; the adapter then no-ops.
    fn is_available(&self) -> bool;

    /// Posts newer than `since`, oldest first. With no `since`, the most
    /// recent page.
    fn fetch(&self, handle: &str, since: Option<&str>) -> Result<TimelineSignal, FetchError>;
}

pub struct TimelineAdapter {
    source: Box<dyn TimelineSource>,
    pool: BoundedPool,
}

impl TimelineAdapter {
    pub fn new(source: Box<dyn TimelineSource>, max_parallel: usize) -> Self {
        Self {
            source,
            pool: BoundedPool::new("timeline", max_parallel),
        }
    }
}

impl SourceAdapter for TimelineAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Timeline
    }

    fn fetch_group(&self, requests: &[FetchRequest]) -> Result<Vec<FetchResult>, FetchError> {
        if !self.source.is_available() {
            if !requests.is_empty() {
                tracing::debug!(count = requests.len(), "Timeline credential absent, skipping group");
            }
            return Ok(requests.iter().map(|_| Ok(Signal::NoData)).collect());
        }
        Ok(self.pool.map(requests, |req| {
            self.source
                .fetch(&req.source_identity, req.since.as_deref())
                .map(Signal::Timeline)
        }))
    }
}

// ============================================================================
// HTTP SOURCE
// ============================================================================

pub struct HttpTimelineSource {
    agent: ureq::Agent,
    api_base: String,
    token: Option<String>,
    max_results: u32,
    user_ids: Mutex<HashMap<String, String>>,
}

impl HttpTimelineSource {
    pub fn new(config: &TimelineConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bearer_token.clone().filter(|t| !t.trim().is_empty()),
            max_results: config.max_results.clamp(5, 100),
            user_ids: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, token: &str, url: &str) -> Result<String, FetchError> {
        let mut response = self
            .agent
            .get(url)
            .header("Authorization", &format!("Bearer {}", token))
            .call()?;
        Ok(response.body_mut().read_to_string()?)
    }

    fn user_id(&self, token: &str, handle: &str) -> Result<String, FetchError> {
        let key = handle.to_lowercase();
        if let Some(id) = self.user_ids.lock().ok().and_then(|m| m.get(&key).cloned()) {
            return Ok(id);
        }
        let body = self.get(token, &format!("{}/2/users/by/username/{}", self.api_base, handle))?;
        let id = parse_user_lookup(handle, &body)?;
        if let Ok(mut m) = self.user_ids.lock() {
            m.insert(key, id.clone());
        }
        Ok(id)
    }
}

impl TimelineSource for HttpTimelineSource {
    fn is_available(&self) -> bool {
        self.token.is_some()
    }

    fn fetch(&self, handle: &str, since: Option<&str>) -> Result<TimelineSignal, FetchError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| FetchError::Session("timeline credential absent".into()))?;
        let user_id = self.user_id(token, handle)?;
        let mut url = format!(
            "{}/2/users/{}/tweets?max_results={}&tweet.fields=created_at",
            self.api_base, user_id, self.max_results
        );
        if let Some(since) = since.filter(|s| s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty()) {
            url.push_str("&since_id=");
            url.push_str(since);
        }
        let body = self.get(token, &url)?;
        Ok(TimelineSignal {
            handle: handle.to_string(),
            items: parse_timeline(handle, &body)?,
        })
    }
}

// ============================================================================
// PAYLOAD
// ============================================================================

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Deserialize)]
struct UserLookup {
    #[serde(default)]
    data: Option<UserData>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Deserialize)]
struct UserData {
    id: String,
}

#[derive(Deserialize)]
struct TimelinePage {
    #[serde(default)]
    data: Vec<PostData>,
}

#[derive(Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

pub fn parse_user_lookup(handle: &str, body: &str) -> Result<String, FetchError> {
    let lookup: UserLookup = serde_json::from_str(body)?;
    match lookup.data {
        Some(user) => Ok(user.id),
        None => {
            let detail = lookup
                .errors
                .into_iter()
                .find_map(|e| e.detail)
                .unwrap_or_else(|| handle.to_string());
            Err(FetchError::NotFound(detail))
        }
    }
}

/// The API answers newest first; items are returned oldest first.
pub fn parse_timeline(handle: &str, body: &str) -> Result<Vec<TimelineItem>, FetchError> {
    let page: TimelinePage = serde_json::from_str(body)?;
    Ok(page
        .data
        .into_iter()
        .rev()
        .map(|p| TimelineItem {
            url: format!("https://x.com/{}/status/{}", handle, p.id),
            id: p.id,
            text: p.text,
            created_at: p.created_at,
        })
        .collect())
}
