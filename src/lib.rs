//! Sourcewatch — content-change watcher for live streams, feeds and timelines.
//!
//! Subscriptions are polled on a fixed interval. Each cycle fetches a fresh
//! signal per subscription, compares it with the stored marker, notifies on
//! new content and commits the marker.

pub mod config;
pub mod constants;
pub mod detect;
pub mod error;
pub mod id_gen;
pub mod notify;
pub mod scheduler;
pub mod sources;
pub mod storage;
pub mod subscription;
pub mod tracing_init;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{WatchError, WatchResult};
