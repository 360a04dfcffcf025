//! Capacity-bounded LRU accounting layer
//!
//! [`Scavenger`] sits in front of a read/write store, tracks the size and
//! last-access time of every key it has seen written, and evicts the
//! least-recently-used entries through the wrapped store whenever the
//! tracked total exceeds its budget. Eviction runs inline on the mutating
//! call that crossed the budget, never on a timer.

use crate::config::EvictionConfig;
use crate::error::Result;
use crate::store::{ByteStream, Entry, Metadata, ReadStore, Store, WriteStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Per-key accounting record
struct DataRecord {
    /// Tracked size in bytes.
    size: u64,
    /// Logical-clock value of the most recent access.
    last_access: AtomicU64,
}

#[derive(Default)]
struct Tracker {
    records: HashMap<String, DataRecord>,
    /// Running total of tracked sizes. Always equals the sum of live
    /// record sizes outside of a scavenge in progress.
    total: u64,
}

/// Size-budgeted eviction engine wrapping a read/write store
///
/// Every mutating operation holds one exclusive lock across the wrapped
/// store call and the accounting update, so the bookkeeping can never be
/// observed torn between the two.
pub struct Scavenger {
    inner: Arc<dyn Store>,
    budget: u64,
    /// Logical clock for LRU ordering.
    clock: AtomicU64,
    tracker: RwLock<Tracker>,
}

impl Scavenger {
    /// Bound `inner` to at most `max_bytes` of tracked data
    pub fn new(inner: Arc<dyn Store>, max_bytes: u64) -> Self {
        Self {
            inner,
            budget: max_bytes,
            clock: AtomicU64::new(0),
            tracker: RwLock::new(Tracker::default()),
        }
    }

    /// Bound `inner` by a configuration value
    pub fn with_config(inner: Arc<dyn Store>, config: EvictionConfig) -> Self {
        Self::new(inner, config.max_bytes)
    }

    /// The wrapped store
    pub fn inner(&self) -> &Arc<dyn Store> {
        &self.inner
    }

    /// Size budget in bytes
    pub fn budget(&self) -> u64 {
        self.budget
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reserve `size` bytes of budget for `key` without a physical write
    ///
    /// Creates the record on first sight and refreshes its access time;
    /// scavenges inline when the reservation pushes the total over budget.
    pub async fn touch(&self, key: &str, size: u64) {
        let mut tracker = self.tracker.write().await;
        let clock = self.tick();

        match tracker.records.get_mut(key) {
            Some(record) => {
                record.size += size;
                record.last_access.store(clock, Ordering::Relaxed);
            }
            None => {
                tracker.records.insert(
                    key.to_string(),
                    DataRecord {
                        size,
                        last_access: AtomicU64::new(clock),
                    },
                );
            }
        }
        tracker.total += size;

        if tracker.total > self.budget {
            self.scavenge(&mut tracker).await;
        }
    }

    /// Whether `key` is currently tracked, independent of the wrapped store
    pub async fn find(&self, key: &str) -> bool {
        self.tracker.read().await.records.contains_key(key)
    }

    /// Current tracked total in bytes
    pub async fn size(&self) -> u64 {
        self.tracker.read().await.total
    }

    /// Delegated read; refreshes recency for keys already tracked
    ///
    /// A hit on an untracked key stays untracked: pass-through reads never
    /// inflate the budget.
    pub async fn get(&self, key: &str, metadata: Metadata) -> Result<Entry> {
        debug!("Scavenger::get {}", key);

        let tracker = self.tracker.read().await;
        let entry = self.inner.get(key, metadata).await?;

        if let Some(record) = tracker.records.get(key) {
            record.last_access.store(self.tick(), Ordering::Relaxed);
        }

        Ok(entry)
    }

    /// Delegated write with accounting
    ///
    /// The physical write happens first; a failed write changes no
    /// bookkeeping. On success the store-reported byte count replaces any
    /// size previously tracked for the key.
    pub async fn put(&self, key: &str, metadata: Metadata, data: ByteStream) -> Result<u64> {
        debug!("Scavenger::put {}", key);

        let mut tracker = self.tracker.write().await;
        let written = self.inner.put(key, metadata, data).await?;
        let clock = self.tick();

        let previous = match tracker.records.get_mut(key) {
            Some(record) => {
                let previous = record.size;
                record.size = written;
                record.last_access.store(clock, Ordering::Relaxed);
                previous
            }
            None => {
                tracker.records.insert(
                    key.to_string(),
                    DataRecord {
                        size: written,
                        last_access: AtomicU64::new(clock),
                    },
                );
                0
            }
        };
        tracker.total = tracker.total - previous + written;

        debug!(
            "Scavenger::put {}: tracking {} of {} bytes",
            key, tracker.total, self.budget
        );

        if tracker.total > self.budget {
            self.scavenge(&mut tracker).await;
        }

        Ok(written)
    }

    /// Delegated delete with accounting
    pub async fn delete(&self, key: &str, metadata: Metadata) -> Result<()> {
        debug!("Scavenger::delete {}", key);

        let mut tracker = self.tracker.write().await;
        self.inner.delete(key, metadata).await?;

        if let Some(record) = tracker.records.remove(key) {
            tracker.total -= record.size;
        }

        Ok(())
    }

    /// One eviction pass, oldest access first
    ///
    /// Frees at least `total - budget` bytes; overshooting is accepted,
    /// undershooting is not. A failed store delete leaves that record
    /// tracked.
    async fn scavenge(&self, tracker: &mut Tracker) {
        let target = tracker.total - self.budget;
        debug!(
            "scavenging: {} tracked, {} budget, need {}",
            tracker.total, self.budget, target
        );

        let mut victims: Vec<(String, u64, u64)> = tracker
            .records
            .iter()
            .map(|(key, record)| {
                (
                    key.clone(),
                    record.last_access.load(Ordering::Relaxed),
                    record.size,
                )
            })
            .collect();
        victims.sort_by_key(|(_, last_access, _)| *last_access);

        let mut freed = 0u64;
        for (key, _, size) in victims {
            if freed >= target {
                break;
            }
            match self.inner.delete(&key, None).await {
                Ok(()) => {
                    tracker.records.remove(&key);
                    tracker.total -= size;
                    freed += size;
                    debug!("evicted {} ({} bytes)", key, size);
                }
                Err(e) => warn!("eviction of {} failed: {}", key, e),
            }
        }
    }
}

#[async_trait]
impl ReadStore for Scavenger {
    async fn get(&self, key: &str, metadata: Metadata) -> Result<Entry> {
        Scavenger::get(self, key, metadata).await
    }
}

#[async_trait]
impl WriteStore for Scavenger {
    async fn put(&self, key: &str, metadata: Metadata, data: ByteStream) -> Result<u64> {
        Scavenger::put(self, key, metadata, data).await
    }

    async fn delete(&self, key: &str, metadata: Metadata) -> Result<()> {
        Scavenger::delete(self, key, metadata).await
    }
}
