//! Notification emitter — renders a detected change and delivers it.
//!
//! Delivery is a narrow capability (`Notifier`). Two implementations ship:
//!   - `LogNotifier`: structured log line per message
//!   - `WebhookNotifier`: Discord-compatible webhook POST to the destination

use std::time::Duration;

use serde::Serialize;

use crate::config::{NotifierConfig, NotifierMode};
use crate::constants::MAX_DESCRIPTION_CHARS;
use crate::detect::{self, Decision};
use crate::error::{WatchError, WatchResult};
use crate::sources::Signal;
use crate::subscription::Subscription;

/// A change that passed detection and filtering.
pub struct Change<'a> {
    pub subscription: &'a Subscription,
    pub decision: &'a Decision,
    pub signal: &'a Signal,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, change: &Change<'_>) -> WatchResult<()>;
}

pub fn build_notifier(config: &NotifierConfig) -> Box<dyn Notifier> {
    match config.mode {
        NotifierMode::Log => Box::new(LogNotifier::new(config.mention.clone())),
        NotifierMode::Webhook => Box::new(WebhookNotifier::new(config)),
    }
}

// ============================================================================
// RENDERING
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Presentation-neutral message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub content: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub fields: Vec<Field>,
    pub footer: Option<String>,
    pub color: u32,
}

const COLOR_LIVE: u32 = 0x53FC18;
const COLOR_FEED: u32 = 0x2ECC71;
const COLOR_VIDEO: u32 = 0xE74C3C;
const COLOR_TIMELINE: u32 = 0x1DA1F2;

/// One message per announced item. Timeline changes may carry several
/// posts; those passing the subscription's keyword filter are rendered
/// oldest first.
pub fn render(change: &Change<'_>, mention: Option<&str>) -> Vec<Message> {
    match change.signal {
        Signal::Stream(s) => {
            let mut fields = Vec::new();
            if let Some(cat) = &s.category {
                fields.push(Field { name: "Category".into(), value: cat.clone(), inline: true });
            }
            fields.push(Field {
                name: "Viewers".into(),
                value: s.viewers.unwrap_or(0).to_string(),
                inline: true,
            });
            let headline = format!("{} is now live!", s.username);
            vec![Message {
                content: Some(match mention {
                    Some(m) if !m.is_empty() => format!("{} {}", m, headline),
                    _ => headline.clone(),
                }),
                title: headline,
                url: Some(s.url.clone()),
                description: s.title.as_deref().map(|t| truncate(t, MAX_DESCRIPTION_CHARS)),
                author: Some("Kick".into()),
                image: s.thumbnail.clone(),
                thumbnail: s.profile_pic.clone(),
                fields,
                footer: Some("Stream started".into()),
                color: COLOR_LIVE,
            }]
        }
        Signal::Feed(f) => {
            let Some(entry) = &f.latest else {
                return Vec::new();
            };
            let is_video = entry.id.starts_with("yt:video:");
            vec![Message {
                content: None,
                title: format!("New: {}", entry.title.as_deref().unwrap_or("(untitled)")),
                url: entry.link.clone(),
                description: f.feed_title.as_ref().map(|t| format!("New content from **{}**", t)),
                author: entry.author.clone(),
                image: entry.image.clone(),
                thumbnail: None,
                fields: Vec::new(),
                footer: None,
                color: if is_video { COLOR_VIDEO } else { COLOR_FEED },
            }]
        }
        Signal::Timeline(t) => detect::timeline_items(change.subscription.filter.as_ref(), &t.items)
            .into_iter()
            .map(|item| Message {
                content: None,
                title: format!("New post from @{}", t.handle),
                url: Some(item.url.clone()),
                description: Some(truncate(&item.text, MAX_DESCRIPTION_CHARS)),
                author: Some(format!("@{}", t.handle)),
                footer: item.created_at.map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string()),
                color: COLOR_TIMELINE,
                ..Default::default()
            })
            .collect(),
        Signal::NoData => Vec::new(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ============================================================================
// LOG
// ============================================================================

pub struct LogNotifier {
    mention: Option<String>,
}

impl LogNotifier {
    pub fn new(mention: Option<String>) -> Self {
        Self { mention }
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, change: &Change<'_>) -> WatchResult<()> {
        for msg in render(change, self.mention.as_deref()) {
            tracing::info!(
                sub = %change.subscription.id,
                destination = %change.subscription.destination,
                title = %msg.title,
                url = msg.url.as_deref().unwrap_or(""),
                "Notification"
            );
        }
        Ok(())
    }
}

// ============================================================================
// WEBHOOK
// ============================================================================

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: Vec<Embed<'a>>,
}

#[derive(Serialize)]
struct Embed<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<NameRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<UrlRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<UrlRef<'a>>,
    #[serde(skip_serializing_if = "<[Field]>::is_empty")]
    fields: &'a [Field],
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<TextRef<'a>>,
}

#[derive(Serialize)]
struct NameRef<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct UrlRef<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct TextRef<'a> {
    text: &'a str,
}

fn payload(msg: &Message) -> WebhookPayload<'_> {
    WebhookPayload {
        content: msg.content.as_deref(),
        embeds: vec![Embed {
            title: &msg.title,
            url: msg.url.as_deref(),
            description: msg.description.as_deref(),
            color: msg.color,
            author: msg.author.as_deref().map(|name| NameRef { name }),
            image: msg.image.as_deref().map(|url| UrlRef { url }),
            thumbnail: msg.thumbnail.as_deref().map(|url| UrlRef { url }),
            fields: &msg.fields,
            footer: msg.footer.as_deref().map(|text| TextRef { text }),
        }],
    }
}

pub struct WebhookNotifier {
    agent: ureq::Agent,
    mention: Option<String>,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            mention: config.mention.clone(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, change: &Change<'_>) -> WatchResult<()> {
        let url = change.subscription.destination.as_str();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(WatchError::Notify(format!(
                "destination is not a webhook URL: {}",
                change.subscription.destination
            )));
        }
        for msg in render(change, self.mention.as_deref()) {
            self.agent
                .post(url)
                .send_json(payload(&msg))
                .map_err(|e| WatchError::Notify(e.to_string()))?;
        }
        tracing::debug!(sub = %change.subscription.id, "Webhook delivered");
        Ok(())
    }
}
