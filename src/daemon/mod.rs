use std::sync::Arc;

use sourcewatch::config::WatcherConfig;
use sourcewatch::notify::build_notifier;
use sourcewatch::scheduler::{self, Scheduler};
use sourcewatch::sources::Adapters;
use sourcewatch::storage::{path_utils, SubscriptionStore};

/// Run the watcher in foreground mode until SIGINT/SIGTERM.
///
/// The signal sets the shutdown flag; the scheduler finishes the cycle in progress
/// (markers are committed per subscription, so nothing is half-applied) and
/// returns from its sleep within `SHUTDOWN_CHECK_MS`.
pub fn run() {
    sourcewatch::tracing_init::init_file_tracing();

    let config = WatcherConfig::load();
    let store_path = config.store_path();
    tracing::info!(
        store = %store_path.display(),
        interval_secs = config.poll_interval_secs,
        notifier = ?config.notifier.mode,
        timeline_enabled = config.timeline_enabled(),
        "Starting sourcewatch daemon"
    );

    let data_dir = path_utils::data_dir();
    std::fs::create_dir_all(&data_dir).ok();
    let pid_path = path_utils::pid_path();
    if let Err(e) = std::fs::write(&pid_path, std::process::id().to_string()) {
        tracing::warn!(path = %pid_path.display(), error = %e, "Cannot write PID file");
    }

    let shutdown = scheduler::shutdown_on_signals();

    let store = Arc::new(SubscriptionStore::open(store_path));
    let scheduler = Scheduler::new(
        store,
        Adapters::from_config(&config),
        build_notifier(&config.notifier),
    );

    scheduler.run_loop(&shutdown, config.poll_interval());

    tracing::info!("Shutting down...");
    let _ = std::fs::remove_file(&pid_path);
    tracing::info!("Daemon shutdown complete");
}
