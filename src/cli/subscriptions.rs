use anyhow::{bail, Context, Result};
use sourcewatch::storage::AddOutcome;
use sourcewatch::subscription::{NewSubscription, SourceKind, SubscriptionFilter};

/// Source named on the command line.
pub enum AddTarget {
    Stream(String),
    Feed(String),
    Youtube(String),
    Timeline(String),
}

/// `add <kind> <identity> --dest <destination>`
pub fn add(
    target: AddTarget,
    destination: &str,
    scope: Option<&str>,
    filter: SubscriptionFilter,
) -> Result<()> {
    let new = match &target {
        AddTarget::Stream(name) => NewSubscription::stream(name, destination),
        AddTarget::Feed(url) => NewSubscription::feed(url, destination),
        AddTarget::Youtube(channel) => NewSubscription::youtube(channel, destination),
        AddTarget::Timeline(handle) => NewSubscription::timeline(handle, destination),
    }?
    .with_scope(scope)
    .with_filter(filter);

    let store = super::open_store();
    match store.add(new).context("Failed to save subscription")? {
        AddOutcome::Added(sub) => {
            println!("Added {} ({})", sub.source_identity, sub.id);
            if sub.kind == SourceKind::Timeline
                && !sourcewatch::config::WatcherConfig::load().timeline_enabled()
            {
                println!(
                    "Note: no timeline credential configured; set {} to start polling it",
                    sourcewatch::constants::TIMELINE_TOKEN_ENV
                );
            }
        }
        AddOutcome::AlreadyExists(sub) => {
            println!("Already tracking {} for {} ({})", sub.source_identity, sub.destination, sub.id);
        }
    }
    Ok(())
}

/// `list [--scope S]`: numbered rows; the number is valid for `remove --number`.
pub fn list(scope: Option<&str>) -> Result<()> {
    let store = super::open_store();
    let rows = store.list(scope);
    if rows.is_empty() {
        println!("No subscriptions");
        return Ok(());
    }
    println!("{:>3}  {:<9} {:<40} {:<24} {}", "#", "KIND", "SOURCE", "DESTINATION", "MARKER");
    for row in rows {
        let sub = &row.subscription;
        let marker = sub
            .marker
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>3}  {:<9} {:<40} {:<24} {}",
            row.ordinal,
            sub.kind.as_str(),
            sub.source_identity,
            sub.destination,
            marker
        );
    }
    Ok(())
}

/// `remove <id>` or `remove --number N [--scope S]`.
///
/// An ordinal is resolved to a stable id first; deletion is always by id.
pub fn remove(id: Option<&str>, number: Option<usize>, scope: Option<&str>) -> Result<()> {
    let store = super::open_store();
    let id = match (id, number) {
        (Some(id), _) => id.to_string(),
        (None, Some(n)) => match store.resolve_ordinal(scope, n) {
            Some(id) => id,
            None => bail!("No subscription #{} in the current listing", n),
        },
        (None, None) => bail!("Specify a subscription id or --number"),
    };

    match store.remove(&id).context("Failed to save subscriptions")? {
        Some(sub) => println!("Removed {} ({})", sub.source_identity, sub.id),
        None => bail!("Subscription not found: {}", id),
    }
    Ok(())
}
