//! Change detection — pure decision logic per source kind.
//!
//! Stream:  offline→live and live→offline are transitions; the marker is the
//!          live flag.
//! Feed / timeline: the marker is the last-seen item id. An absent marker is
//!          seeded silently (first observation) so a new subscription does not
//!          announce content that already existed.
//!
//! The filter stage only gates emission. A filtered change still advances the
//! marker, otherwise the same stale item would be re-evaluated every cycle.

use crate::sources::{Signal, TimelineItem};
use crate::subscription::{Marker, SubscriptionFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoChange,
    /// Seed the marker, do not notify.
    FirstObservation(Marker),
    NewItem(Marker),
    Transition(Marker),
}

impl Decision {
    /// Marker to commit, if any.
    pub fn new_marker(&self) -> Option<&Marker> {
        match self {
            Decision::NoChange => None,
            Decision::FirstObservation(m) | Decision::NewItem(m) | Decision::Transition(m) => Some(m),
        }
    }

    /// New items and go-live transitions are announced. Seeding and
    /// going offline are recorded only.
    pub fn is_announceable(&self) -> bool {
        match self {
            Decision::NewItem(_) => true,
            Decision::Transition(m) => m.is_live(),
            Decision::NoChange | Decision::FirstObservation(_) => false,
        }
    }
}

pub fn decide(old: Option<&Marker>, signal: &Signal) -> Decision {
    match signal {
        Signal::Stream(s) => decide_stream(old, s.live),
        Signal::Feed(f) => decide_item(old, f.latest.as_ref().map(|e| e.id.as_str())),
        Signal::Timeline(t) => decide_item(old, t.latest().map(|i| i.id.as_str())),
        Signal::NoData => Decision::NoChange,
    }
}

fn decide_stream(old: Option<&Marker>, live_now: bool) -> Decision {
    let was_live = old.map(Marker::is_live).unwrap_or(false);
    match (was_live, live_now) {
        (false, true) => Decision::Transition(Marker::Live(true)),
        (true, false) => Decision::Transition(Marker::Live(false)),
        _ => Decision::NoChange,
    }
}

fn decide_item(old: Option<&Marker>, latest: Option<&str>) -> Decision {
    let Some(latest) = latest else {
        return Decision::NoChange;
    };
    match old.and_then(Marker::item_id) {
        None => Decision::FirstObservation(Marker::Item(latest.to_string())),
        Some(seen) if seen == latest => Decision::NoChange,
        Some(_) => Decision::NewItem(Marker::Item(latest.to_string())),
    }
}

/// Filter stage. No filter, or an empty one, allows everything.
/// Constraints that do not apply to a signal's kind are ignored.
///
/// A timeline batch passes when at least one post matches; `timeline_items`
/// then narrows the batch to the matching posts for rendering.
pub fn allows(filter: Option<&SubscriptionFilter>, signal: &Signal) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    match signal {
        Signal::Stream(s) => {
            if let Some(min) = filter.min_viewers {
                if s.viewers.unwrap_or(0) < min {
                    return false;
                }
            }
            matches_category(&filter.categories, s.category.iter())
                && matches_keyword(&filter.keywords, s.title.iter())
        }
        Signal::Feed(f) => match &f.latest {
            Some(entry) => {
                matches_category(&filter.categories, entry.categories.iter())
                    && matches_keyword(&filter.keywords, entry.title.iter())
            }
            None => true,
        },
        Signal::Timeline(t) => matches_keyword(&filter.keywords, t.items.iter().map(|i| &i.text)),
        Signal::NoData => true,
    }
}

/// Posts of a timeline batch that pass the keyword filter, in batch order.
pub fn timeline_items<'a>(filter: Option<&SubscriptionFilter>, items: &'a [TimelineItem]) -> Vec<&'a TimelineItem> {
    let keywords = filter.map(|f| f.keywords.as_slice()).unwrap_or(&[]);
    items
        .iter()
        .filter(|item| matches_keyword(keywords, std::iter::once(&item.text)))
        .collect()
}

fn matches_category<'a>(allowed: &[String], actual: impl Iterator<Item = &'a String>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let actual: Vec<&String> = actual.collect();
    allowed
        .iter()
        .any(|want| actual.iter().any(|have| have.eq_ignore_ascii_case(want.trim())))
}

fn matches_keyword<'a>(keywords: &[String], texts: impl Iterator<Item = &'a String>) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let texts: Vec<String> = texts.map(|t| t.to_lowercase()).collect();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .any(|k| texts.iter().any(|t| t.contains(&k)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FeedEntry, FeedSignal, StreamSignal, TimelineItem, TimelineSignal};

    fn stream(live: bool) -> Signal {
        Signal::Stream(StreamSignal {
            username: "s".into(),
            live,
            viewers: Some(150),
            category: Some("Just Chatting".into()),
            title: Some("Morning coffee stream".into()),
            ..Default::default()
        })
    }

    fn feed(id: &str) -> Signal {
        Signal::Feed(FeedSignal {
            feed_title: Some("Blog".into()),
            latest: Some(FeedEntry {
                id: id.into(),
                title: Some("Release notes 1.2".into()),
                categories: vec!["Releases".into()],
                ..Default::default()
            }),
        })
    }

    fn item(id: &str) -> Marker {
        Marker::Item(id.into())
    }

    #[test]
    fn test_unchanged_signal_is_idempotent() {
        let s = feed("x");
        assert_eq!(decide(Some(&item("x")), &s), Decision::NoChange);
        assert_eq!(decide(Some(&item("x")), &s), Decision::NoChange);
        assert_eq!(decide(Some(&Marker::Live(true)), &stream(true)), Decision::NoChange);
        assert_eq!(decide(Some(&Marker::Live(false)), &stream(false)), Decision::NoChange);
    }

    #[test]
    fn test_first_observation_seeds_without_announcing() {
        let d = decide(None, &feed("x"));
        assert_eq!(d, Decision::FirstObservation(item("x")));
        assert!(!d.is_announceable());
        assert_eq!(d.new_marker(), Some(&item("x")));
    }

    #[test]
    fn test_new_item() {
        let d = decide(Some(&item("x")), &feed("y"));
        assert_eq!(d, Decision::NewItem(item("y")));
        assert!(d.is_announceable());
    }

    #[test]
    fn test_stream_goes_live_and_offline() {
        let live = decide(Some(&Marker::Live(false)), &stream(true));
        assert_eq!(live, Decision::Transition(Marker::Live(true)));
        assert!(live.is_announceable());
        assert_eq!(decide(None, &stream(true)), Decision::Transition(Marker::Live(true)));

        let off = decide(Some(&Marker::Live(true)), &stream(false));
        assert_eq!(off, Decision::Transition(Marker::Live(false)));
        assert!(!off.is_announceable());
    }

    #[test]
    fn test_empty_sources_are_no_change() {
        let empty = Signal::Feed(FeedSignal::default());
        assert_eq!(decide(None, &empty), Decision::NoChange);
        let quiet = Signal::Timeline(TimelineSignal {
            handle: "h".into(),
            items: vec![],
        });
        assert_eq!(decide(Some(&item("5")), &quiet), Decision::NoChange);
        assert_eq!(decide(None, &Signal::NoData), Decision::NoChange);
    }

    #[test]
    fn test_timeline_uses_newest_of_oldest_first_items() {
        let t = Signal::Timeline(TimelineSignal {
            handle: "h".into(),
            items: vec![
                TimelineItem { id: "6".into(), ..Default::default() },
                TimelineItem { id: "7".into(), ..Default::default() },
            ],
        });
        assert_eq!(decide(Some(&item("5")), &t), Decision::NewItem(item("7")));
    }

    #[test]
    fn test_filter_min_viewers_and_category() {
        let f = SubscriptionFilter {
            min_viewers: Some(100),
            categories: vec!["just chatting".into()],
            keywords: vec![],
        };
        assert!(allows(Some(&f), &stream(true)));

        let strict = SubscriptionFilter { min_viewers: Some(1000), ..f.clone() };
        assert!(!allows(Some(&strict), &stream(true)));

        let other_cat = SubscriptionFilter { categories: vec!["Slots".into()], ..f };
        assert!(!allows(Some(&other_cat), &stream(true)));
    }

    #[test]
    fn test_filter_keywords() {
        let f = SubscriptionFilter {
            keywords: vec!["RELEASE".into()],
            ..Default::default()
        };
        assert!(allows(Some(&f), &feed("a")));
        let miss = SubscriptionFilter {
            keywords: vec!["podcast".into()],
            ..Default::default()
        };
        assert!(!allows(Some(&miss), &feed("a")));
        assert!(allows(None, &feed("a")));
        assert!(allows(Some(&SubscriptionFilter::default()), &feed("a")));
    }

    #[test]
    fn test_timeline_batch_passes_but_renders_matching_posts_only() {
        let post = |id: &str, text: &str| TimelineItem {
            id: id.into(),
            text: text.into(),
            ..Default::default()
        };
        let items = vec![post("6", "lunch"), post("7", "Release 1.2 is out"), post("8", "more lunch")];
        let f = SubscriptionFilter {
            keywords: vec!["release".into()],
            ..Default::default()
        };
        let batch = Signal::Timeline(TimelineSignal {
            handle: "h".into(),
            items: items.clone(),
        });
        assert!(allows(Some(&f), &batch));

        let kept: Vec<&str> = timeline_items(Some(&f), &items).iter().map(|i| i.id.as_str()).collect();
        assert_eq!(kept, vec!["7"]);
        assert_eq!(timeline_items(None, &items).len(), 3);
    }
}
