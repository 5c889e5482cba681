//! Subscription Store — the single owner of the durable snapshot.
//!
//! The in-memory cache is the source of truth for the running process and is
//! reloaded when the file's stamp (mtime + length) changes underneath it.
//! Every read-modify-write runs inside one exclusion section:
//!   1. in-process `Mutex` over the cache
//!   2. advisory exclusive lock on `<store>.lock` (CLI and daemon share the file)
//!   3. refresh from disk, apply the mutation, write temp file + rename
//!
//! A failed write leaves the mutation applied in memory. Marker updates that
//! never reached disk are remembered and re-applied if the file is reloaded.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use fs2::FileExt;
use serde_json::Value;

use super::record::{self, Snapshot};
use crate::error::{WatchError, WatchResult};
use crate::subscription::{Marker, NewSubscription, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

#[derive(Default)]
struct StoreCache {
    subs: Vec<Subscription>,
    /// Records on disk that failed to decode. Written back unchanged.
    unreadable: Vec<Value>,
    stamp: Option<FileStamp>,
    loaded: bool,
    /// Set by a mutation, cleared by a successful write.
    dirty: bool,
    /// Marker updates not yet on disk, keyed by subscription id.
    pending: HashMap<String, Option<Marker>>,
}

/// Outcome of an add request.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(Subscription),
    AlreadyExists(Subscription),
}

/// One row of a listing: 1-based display ordinal plus the stable record.
#[derive(Debug, Clone)]
pub struct Listed {
    pub ordinal: usize,
    pub subscription: Subscription,
}

pub struct SubscriptionStore {
    path: PathBuf,
    lock_path: PathBuf,
    cache: Mutex<StoreCache>,
}

impl SubscriptionStore {
    /// No I/O happens until the first `load`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            cache: Mutex::new(StoreCache::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot. Missing or corrupt file yields an empty collection.
    pub fn load(&self) -> Vec<Subscription> {
        let mut cache = self.cache();
        self.refresh(&mut *cache);
        cache.subs.clone()
    }

    /// Replace the whole snapshot. Unreadable records on disk are kept.
    pub fn save(&self, subs: Vec<Subscription>) -> WatchResult<()> {
        self.transact(|cache| {
            cache.subs = subs;
            cache.pending.clear();
            cache.dirty = true;
            Ok(())
        })
    }

    /// Update only the marker of `id`. Returns false if the id is gone
    /// (removed between fetch and commit), in which case nothing is written.
    pub fn upsert_marker(&self, id: &str, marker: Option<Marker>) -> WatchResult<bool> {
        self.transact(|cache| {
            let Some(sub) = cache.subs.iter_mut().find(|s| s.id == id) else {
                return Ok(false);
            };
            if sub.marker == marker {
                return Ok(true);
            }
            sub.marker = marker.clone();
            cache.pending.insert(id.to_string(), marker);
            cache.dirty = true;
            Ok(true)
        })
    }

    /// Rejects duplicates on (kind, source_identity, destination).
    pub fn add(&self, new: NewSubscription) -> WatchResult<AddOutcome> {
        self.transact(|cache| {
            if let Some(existing) = cache
                .subs
                .iter()
                .find(|s| s.same_target(new.kind, &new.source_identity, &new.destination))
            {
                return Ok(AddOutcome::AlreadyExists(existing.clone()));
            }
            let sub = new.into_subscription();
            cache.subs.push(sub.clone());
            cache.dirty = true;
            Ok(AddOutcome::Added(sub))
        })
    }

    /// Remove by stable id.
    pub fn remove(&self, id: &str) -> WatchResult<Option<Subscription>> {
        self.transact(|cache| {
            let Some(pos) = cache.subs.iter().position(|s| s.id == id) else {
                return Ok(None);
            };
            let removed = cache.subs.remove(pos);
            cache.pending.remove(id);
            cache.dirty = true;
            Ok(Some(removed))
        })
    }

    /// Subscriptions visible to `scope`, numbered from 1 in store order.
    pub fn list(&self, scope: Option<&str>) -> Vec<Listed> {
        self.load()
            .into_iter()
            .filter(|s| s.visible_to(scope))
            .enumerate()
            .map(|(i, subscription)| Listed {
                ordinal: i + 1,
                subscription,
            })
            .collect()
    }

    /// Map a display ordinal from `list(scope)` to its stable id.
    pub fn resolve_ordinal(&self, scope: Option<&str>, ordinal: usize) -> Option<String> {
        self.list(scope)
            .into_iter()
            .find(|l| l.ordinal == ordinal)
            .map(|l| l.subscription.id)
    }

    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.load().into_iter().find(|s| s.id == id)
    }

    // ------------------------------------------------------------------

    fn cache(&self) -> MutexGuard<'_, StoreCache> {
        // A panic inside another subscription's pipeline must not wedge the store.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-modify-write under the full exclusion section.
    fn transact<T>(&self, f: impl FnOnce(&mut StoreCache) -> WatchResult<T>) -> WatchResult<T> {
        let mut cache = self.cache();
        let _file_lock = self.lock_file();
        self.refresh(&mut *cache);
        let out = f(&mut *cache)?;
        if cache.dirty {
            self.persist(&mut *cache)?;
        }
        Ok(out)
    }

    /// Held for the duration of a transaction; released on drop.
    /// Failure to lock degrades to in-process exclusion only.
    fn lock_file(&self) -> Option<File> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = match OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
        {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %self.lock_path.display(), error = %e, "Cannot open store lock file");
                return None;
            }
        };
        match file.lock_exclusive() {
            Ok(()) => Some(file),
            Err(e) => {
                tracing::warn!(path = %self.lock_path.display(), error = %e, "Cannot lock store");
                None
            }
        }
    }

    fn current_stamp(&self) -> Option<FileStamp> {
        std::fs::metadata(&self.path).ok().map(|m| FileStamp {
            modified: m.modified().ok(),
            len: m.len(),
        })
    }

    /// Reload from disk on first use or when the file changed externally.
    fn refresh(&self, cache: &mut StoreCache) {
        let stamp = self.current_stamp();
        if cache.loaded && stamp == cache.stamp {
            return;
        }
        let Snapshot { mut subs, unreadable } = self.read_file();
        if !cache.pending.is_empty() {
            for sub in subs.iter_mut() {
                if let Some(marker) = cache.pending.get(&sub.id) {
                    sub.marker = marker.clone();
                }
            }
            cache.pending.retain(|id, _| subs.iter().any(|s| &s.id == id));
        }
        if cache.loaded {
            tracing::debug!(path = %self.path.display(), count = subs.len(), "Store reloaded after external change");
        }
        cache.subs = subs;
        cache.unreadable = unreadable;
        cache.stamp = stamp;
        cache.loaded = true;
    }

    fn read_file(&self) -> Snapshot {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Snapshot::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot read store, using empty snapshot");
                return Snapshot::default();
            }
        };
        if content.trim().is_empty() {
            return Snapshot::default();
        }
        match serde_json::from_str::<Vec<Value>>(&content) {
            Ok(values) => record::decode_records(values),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Corrupt store, using empty snapshot");
                let backup = self.path.with_extension("json.corrupt");
                if let Err(e) = std::fs::copy(&self.path, &backup) {
                    tracing::warn!(error = %e, "Failed to back up corrupt store");
                }
                Snapshot::default()
            }
        }
    }

    fn persist(&self, cache: &mut StoreCache) -> WatchResult<()> {
        match self.write_atomic(&cache.subs, &cache.unreadable) {
            Ok(()) => {
                cache.stamp = self.current_stamp();
                cache.dirty = false;
                cache.pending.clear();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Store write failed, keeping in-memory state"
                );
                Err(e)
            }
        }
    }

    fn write_atomic(&self, subs: &[Subscription], unreadable: &[Value]) -> WatchResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = record::encode_records(subs, unreadable)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            WatchError::Storage(format!("rename {} failed: {}", tmp.display(), e))
        })
    }
}
