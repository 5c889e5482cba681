//! Durable record format.
//!
//! The store file is a JSON array of subscription records. Two layouts are
//! accepted on load:
//!   - current: `{ "id", "kind", "source_identity", "destination", "marker", ... }`
//!   - legacy:  `{ "type": "kick"|"rss"|"youtube", "username"|"url",
//!                 "discord_channel_id", "was_live"|"last_entry_id" }`
//!
//! Legacy records are upgraded in memory and written back in the current
//! layout on the next save. A malformed record is skipped, not fatal, and is
//! carried through saves verbatim so it is never erased from disk.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{WatchError, WatchResult};
use crate::id_gen;
use crate::subscription::{Marker, SourceKind, Subscription};

#[derive(Deserialize)]
struct LegacyRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    discord_channel_id: Option<Value>,
    #[serde(default)]
    guild_id: Option<Value>,
    #[serde(default)]
    was_live: Option<bool>,
    #[serde(default)]
    last_entry_id: Option<String>,
}

/// Decoded file contents.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub subs: Vec<Subscription>,
    /// Records that could not be decoded, kept as read.
    pub unreadable: Vec<Value>,
}

/// Decode the whole snapshot. Invalid records are set aside in
/// `unreadable`; duplicate ids are dropped. Both are logged. Order of the
/// remaining records is preserved.
pub fn decode_records(values: Vec<Value>) -> Snapshot {
    let mut seen = HashSet::new();
    let mut snapshot = Snapshot {
        subs: Vec::with_capacity(values.len()),
        unreadable: Vec::new(),
    };
    for (index, value) in values.into_iter().enumerate() {
        match decode_record(value.clone()) {
            Ok(sub) => {
                if seen.insert(sub.id.clone()) {
                    snapshot.subs.push(sub);
                } else {
                    tracing::warn!(index, sub = %sub.id, "Duplicate subscription record skipped");
                }
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "Invalid subscription record skipped, kept on disk");
                snapshot.unreadable.push(value);
            }
        }
    }
    snapshot
}

pub fn decode_record(value: Value) -> WatchResult<Subscription> {
    if value.get("kind").is_some() {
        let sub: Subscription = serde_json::from_value(value)?;
        if sub.id.is_empty() || sub.source_identity.is_empty() {
            return Err(WatchError::InvalidInput("record without id or source".into()));
        }
        return Ok(sub);
    }
    if value.get("type").is_some() {
        let legacy: LegacyRecord = serde_json::from_value(value)?;
        return upgrade_legacy(legacy);
    }
    Err(WatchError::InvalidInput("record has neither 'kind' nor 'type'".into()))
}

fn upgrade_legacy(legacy: LegacyRecord) -> WatchResult<Subscription> {
    let kind: SourceKind = legacy.kind.parse()?;
    let identity = match kind {
        SourceKind::Stream => legacy.username.map(|u| u.to_lowercase()),
        SourceKind::Feed => legacy.url,
        SourceKind::Timeline => legacy.username,
    }
    .filter(|s| !s.is_empty())
    .ok_or_else(|| WatchError::InvalidInput(format!("legacy {} record without source", kind)))?;

    let destination = legacy
        .discord_channel_id
        .as_ref()
        .and_then(scalar_to_string)
        .ok_or_else(|| WatchError::InvalidInput("legacy record without destination".into()))?;

    let marker = match kind {
        SourceKind::Stream => Some(Marker::Live(legacy.was_live.unwrap_or(false))),
        SourceKind::Feed | SourceKind::Timeline => legacy.last_entry_id.map(Marker::Item),
    };

    Ok(Subscription {
        id: id_gen::subscription_id(kind, &identity, &destination),
        kind,
        source_identity: identity,
        destination,
        owner_scope: legacy.guild_id.as_ref().and_then(scalar_to_string),
        marker,
        filter: None,
        created_at: None,
    })
}

/// Channel ids were written as JSON numbers by older versions.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Current-layout records first, then unreadable ones unchanged.
pub fn encode_records(subs: &[Subscription], unreadable: &[Value]) -> WatchResult<String> {
    let mut values = Vec::with_capacity(subs.len() + unreadable.len());
    for sub in subs {
        values.push(serde_json::to_value(sub)?);
    }
    values.extend(unreadable.iter().cloned());
    Ok(serde_json::to_string_pretty(&values)?)
}
