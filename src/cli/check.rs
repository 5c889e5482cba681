use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use sourcewatch::config::WatcherConfig;
use sourcewatch::notify::build_notifier;
use sourcewatch::scheduler::Scheduler;
use sourcewatch::sources::Adapters;
use sourcewatch::storage::SubscriptionStore;

/// `check`: run one poll cycle in the foreground and print the tally.
pub fn run() -> Result<()> {
    let config = WatcherConfig::load();
    let store = Arc::new(SubscriptionStore::open(config.store_path()));
    let scheduler = Scheduler::new(
        store,
        Adapters::from_config(&config),
        build_notifier(&config.notifier),
    );

    let started = Instant::now();
    let r = scheduler.run_cycle();
    println!("Checked {} subscriptions in {:.1}s", r.checked, started.elapsed().as_secs_f64());
    println!("  notified:     {}", r.notified);
    println!("  first seen:   {}", r.first_seen);
    println!("  unchanged:    {}", r.unchanged);
    println!("  filtered:     {}", r.suppressed);
    println!("  went offline: {}", r.went_offline);
    println!("  fetch failed: {}", r.failed);
    if r.emit_errors + r.commit_errors + r.skipped_groups > 0 {
        println!(
            "  errors:       {} notify, {} commit, {} skipped groups",
            r.emit_errors, r.commit_errors, r.skipped_groups
        );
    }
    Ok(())
}
