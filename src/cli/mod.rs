pub mod check;
pub mod config;
pub mod daemon;
pub mod subscriptions;

use sourcewatch::config::WatcherConfig;
use sourcewatch::storage::SubscriptionStore;

/// Store at the configured location.
pub fn open_store() -> SubscriptionStore {
    let config = WatcherConfig::load();
    SubscriptionStore::open(config.store_path())
}
