//! Poll scheduler — one cycle fetches every subscription, detects changes,
//! emits notifications and commits markers.
//!
//! Per subscription the order is fixed: detect → filter → emit → commit.
//! A marker is committed only after its emission succeeded, so a crash or a
//! failed delivery replays the change next cycle rather than losing it.
//!
//! Kinds are polled concurrently (one thread per kind group). Within a kind
//! the adapter decides how to fan out. A failure (error or panic) is confined
//! to the subscription, or to the group when the adapter's session fails.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::SHUTDOWN_CHECK_MS;
use crate::detect::{self, Decision};
use crate::notify::{Change, Notifier};
use crate::sources::{Adapters, FetchRequest, Signal};
use crate::storage::SubscriptionStore;
use crate::subscription::{SourceKind, Subscription};

/// Tally of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub unchanged: usize,
    pub first_seen: usize,
    pub notified: usize,
    /// Changes the filter kept quiet; their markers still advanced.
    pub suppressed: usize,
    pub went_offline: usize,
    pub failed: usize,
    pub emit_errors: usize,
    pub commit_errors: usize,
    pub skipped_groups: usize,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.checked += other.checked;
        self.unchanged += other.unchanged;
        self.first_seen += other.first_seen;
        self.notified += other.notified;
        self.suppressed += other.suppressed;
        self.went_offline += other.went_offline;
        self.failed += other.failed;
        self.emit_errors += other.emit_errors;
        self.commit_errors += other.commit_errors;
        self.skipped_groups += other.skipped_groups;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Unchanged,
    FirstSeen,
    WentOffline,
    Notified,
    Suppressed,
    EmitFailed,
    CommitFailed,
}

pub struct Scheduler {
    store: Arc<SubscriptionStore>,
    adapters: Adapters,
    notifier: Box<dyn Notifier>,
}

impl Scheduler {
    pub fn new(store: Arc<SubscriptionStore>, adapters: Adapters, notifier: Box<dyn Notifier>) -> Self {
        Self {
            store,
            adapters,
            notifier,
        }
    }

    /// Run cycles until `shutdown` is set. The first cycle starts
    /// immediately. A cycle that overruns the interval is followed by the
    /// next one without waiting; cycles never overlap.
    pub fn run_loop(&self, shutdown: &AtomicBool, interval: Duration) {
        tracing::info!(interval_secs = interval.as_secs(), "Scheduler started");
        while !shutdown.load(Ordering::Relaxed) {
            let started = Instant::now();
            let report = self.run_cycle();
            let elapsed = started.elapsed();
            tracing::info!(
                checked = report.checked,
                notified = report.notified,
                failed = report.failed,
                elapsed_ms = elapsed.as_millis() as u64,
                "Poll cycle complete"
            );

            if elapsed >= interval {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs(),
                    interval_secs = interval.as_secs(),
                    "Poll cycle overran interval, starting next cycle now"
                );
                continue;
            }
            sleep_until_shutdown(shutdown, interval - elapsed);
        }
        tracing::info!("Scheduler stopped");
    }

    /// One full pass over the current snapshot.
    pub fn run_cycle(&self) -> CycleReport {
        let snapshot = self.store.load();
        if snapshot.is_empty() {
            tracing::debug!("No subscriptions, nothing to poll");
            return CycleReport::default();
        }

        let mut groups: BTreeMap<SourceKind, Vec<Subscription>> = BTreeMap::new();
        for sub in snapshot {
            groups.entry(sub.kind).or_default().push(sub);
        }

        let mut report = CycleReport::default();
        std::thread::scope(|scope| {
            let handles: Vec<_> = groups
                .iter()
                .map(|(kind, subs)| {
                    let kind = *kind;
                    let handle = std::thread::Builder::new()
                        .name(format!("poll-{}", kind))
                        .spawn_scoped(scope, move || self.run_group(kind, subs));
                    (kind, subs.len(), handle)
                })
                .collect();

            for (kind, count, handle) in handles {
                let joined = match handle {
                    Ok(h) => h.join().map_err(|_| "panicked".to_string()),
                    Err(e) => Err(e.to_string()),
                };
                match joined {
                    Ok(group_report) => report.merge(group_report),
                    Err(e) => {
                        tracing::error!(kind = %kind, count, error = %e, "Poll group aborted");
                        report.skipped_groups += 1;
                    }
                }
            }
        });
        report
    }

    fn run_group(&self, kind: SourceKind, subs: &[Subscription]) -> CycleReport {
        let mut report = CycleReport::default();
        let requests: Vec<FetchRequest> = subs.iter().map(FetchRequest::from).collect();

        let adapter = self.adapters.for_kind(kind);
        tracing::debug!(kind = %adapter.kind(), count = requests.len(), "Fetching group");
        let results = match adapter.fetch_group(&requests) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(kind = %kind, count = subs.len(), error = %e, "Source group unavailable, skipping this cycle");
                report.skipped_groups += 1;
                return report;
            }
        };

        for (sub, result) in subs.iter().zip(results) {
            report.checked += 1;
            let signal = match result {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(sub = %sub.id, error = %e, "Fetch failed");
                    report.failed += 1;
                    continue;
                }
            };
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.process(sub, &signal)));
            match outcome {
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Ok(Outcome::FirstSeen) => report.first_seen += 1,
                Ok(Outcome::WentOffline) => report.went_offline += 1,
                Ok(Outcome::Notified) => report.notified += 1,
                Ok(Outcome::Suppressed) => report.suppressed += 1,
                Ok(Outcome::EmitFailed) => report.emit_errors += 1,
                Ok(Outcome::CommitFailed) => report.commit_errors += 1,
                Err(_) => {
                    tracing::error!(sub = %sub.id, "Subscription pipeline panicked. Cycle continues.");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn process(&self, sub: &Subscription, signal: &Signal) -> Outcome {
        let decision = detect::decide(sub.marker.as_ref(), signal);
        let Some(marker) = decision.new_marker().cloned() else {
            return Outcome::Unchanged;
        };

        let outcome = if !decision.is_announceable() {
            match &decision {
                Decision::FirstObservation(_) => {
                    tracing::info!(sub = %sub.id, marker = %marker, "First observation, marker seeded");
                    Outcome::FirstSeen
                }
                _ => {
                    tracing::info!(sub = %sub.id, "Went offline");
                    Outcome::WentOffline
                }
            }
        } else if !detect::allows(sub.filter.as_ref(), signal) {
            tracing::info!(sub = %sub.id, marker = %marker, "Change filtered out");
            Outcome::Suppressed
        } else {
            let change = Change {
                subscription: sub,
                decision: &decision,
                signal,
            };
            if let Err(e) = self.notifier.notify(&change) {
                tracing::warn!(sub = %sub.id, error = %e, "Notification failed, change will be retried");
                return Outcome::EmitFailed;
            }
            Outcome::Notified
        };

        match self.store.upsert_marker(&sub.id, Some(marker)) {
            Ok(true) => outcome,
            Ok(false) => {
                tracing::debug!(sub = %sub.id, "Subscription removed during cycle, marker dropped");
                outcome
            }
            Err(e) => {
                tracing::error!(sub = %sub.id, error = %e, "Marker commit failed");
                Outcome::CommitFailed
            }
        }
    }
}

/// Flag that SIGINT and SIGTERM set to `true`. Starts `false`.
///
/// Registering replaces the default terminate action, so the process only
/// exits once `run_loop` observes the flag.
pub fn shutdown_on_signals() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone()) {
        tracing::warn!(error = %e, "Cannot register SIGINT handler");
    }
    #[cfg(unix)]
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone()) {
        tracing::warn!(error = %e, "Cannot register SIGTERM handler");
    }
    shutdown
}

fn sleep_until_shutdown(shutdown: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(SHUTDOWN_CHECK_MS);
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(step.min(deadline - now));
    }
}
