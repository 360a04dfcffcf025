//! Hierarchical cache composition engine
//!
//! [`TieredCache`] presents a single read/write surface over one
//! authoritative store plus any number of registered children: fallback
//! tiers consulted on a read miss, and fan-out targets mirroring writes and
//! deletes. A fallback hit is returned through a [`BackfillStream`] so the
//! authoritative tier is repopulated as the caller drains the data.

use crate::backfill::BackfillStream;
use crate::config::{FanoutMode, FanoutPolicy};
use crate::error::{Error, Result};
use crate::store::{ByteStream, Entry, Metadata, ReadStore, Store, WriteStore};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Engine-issued identity of a registered child
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChildId(u64);

/// A child tier offered for registration, tagged with its capabilities
///
/// The engine files the child into its fallback-read and/or fan-out-write
/// lists according to which capabilities are present. A child carrying
/// neither (the [`Default`] value) is rejected at registration time.
#[derive(Default)]
pub struct Child {
    read: Option<Arc<dyn ReadStore>>,
    write: Option<Arc<dyn WriteStore>>,
}

impl Child {
    /// A read-only fallback tier
    pub fn read_only(store: Arc<dyn ReadStore>) -> Self {
        Self {
            read: Some(store),
            write: None,
        }
    }

    /// A write-only fan-out target
    pub fn write_only(store: Arc<dyn WriteStore>) -> Self {
        Self {
            read: None,
            write: Some(store),
        }
    }

    /// A tier used both as read fallback and as write/delete fan-out
    pub fn read_write(store: Arc<dyn Store>) -> Self {
        Self {
            read: Some(store.clone()),
            write: Some(store),
        }
    }
}

/// Composition engine over one authoritative store and its children
///
/// The engine exclusively owns its authoritative store; registered children
/// are shared references whose lifetime stays the caller's responsibility.
/// Removing a child never closes it, and never invalidates streams already
/// handed out.
pub struct TieredCache {
    authority: Arc<dyn Store>,
    readers: RwLock<Vec<(ChildId, Arc<dyn ReadStore>)>>,
    writers: RwLock<Vec<(ChildId, Arc<dyn WriteStore>)>>,
    policy: parking_lot::RwLock<FanoutPolicy>,
    next_child: AtomicU64,
}

impl TieredCache {
    /// Create an engine with the default (no fan-out) policy
    pub fn new(authority: Arc<dyn Store>) -> Self {
        Self::with_policy(authority, FanoutPolicy::default())
    }

    /// Create an engine with an explicit fan-out policy
    pub fn with_policy(authority: Arc<dyn Store>, policy: FanoutPolicy) -> Self {
        Self {
            authority,
            readers: RwLock::new(Vec::new()),
            writers: RwLock::new(Vec::new()),
            policy: parking_lot::RwLock::new(policy),
            next_child: AtomicU64::new(0),
        }
    }

    /// The authoritative store this engine writes through
    pub fn authority(&self) -> &Arc<dyn Store> {
        &self.authority
    }

    /// Current fan-out policy
    pub fn policy(&self) -> FanoutPolicy {
        *self.policy.read()
    }

    /// Enable or disable write-through to fan-out children
    pub fn set_write_through(&self, enabled: bool) {
        self.policy.write().write_through = enabled;
    }

    /// Enable or disable delete-through to fan-out children
    pub fn set_delete_through(&self, enabled: bool) {
        self.policy.write().delete_through = enabled;
    }

    /// Set whether fan-out and backfill wait for completion
    pub fn set_fanout_mode(&self, mode: FanoutMode) {
        self.policy.write().mode = mode;
    }

    /// Register a child tier, filing it by capability
    ///
    /// Fails with [`Error::NoCapability`] when the child carries neither
    /// capability; this is reported here, not deferred to first use.
    pub async fn add_child(&self, child: Child) -> Result<ChildId> {
        if child.read.is_none() && child.write.is_none() {
            return Err(Error::NoCapability);
        }

        let id = ChildId(self.next_child.fetch_add(1, Ordering::Relaxed));
        let mut readers = self.readers.write().await;
        let mut writers = self.writers.write().await;
        if let Some(read) = child.read {
            readers.push((id, read));
        }
        if let Some(write) = child.write {
            writers.push((id, write));
        }
        Ok(id)
    }

    /// Unregister a child from both lists
    ///
    /// The child store itself is untouched; streams already returned keep
    /// working.
    pub async fn remove_child(&self, id: ChildId) {
        let mut readers = self.readers.write().await;
        let mut writers = self.writers.write().await;
        readers.retain(|(child, _)| *child != id);
        writers.retain(|(child, _)| *child != id);
    }

    /// Hierarchical read: authority first, then fallbacks in order
    ///
    /// A fallback hit comes back wrapped in a [`BackfillStream`] targeting
    /// the authoritative store, with the fill's completion handle exposed on
    /// the entry. An authority hit is returned unmodified.
    pub async fn get(&self, key: &str, metadata: Metadata) -> Result<Entry> {
        debug!("TieredCache::get {}", key);

        match self.authority.get(key, metadata.clone()).await {
            Ok(entry) => return Ok(entry),
            Err(e) if e.is_not_found() => {}
            Err(e) => debug!("authoritative read for {} failed: {}", key, e),
        }

        let synchronous = self.policy.read().mode == FanoutMode::Synchronous;
        let readers = self.readers.read().await;
        for (id, reader) in readers.iter() {
            match reader.get(key, metadata.clone()).await {
                Ok(fallback) => {
                    debug!("TieredCache::get {} served by child {}", key, id.0);
                    let target: Arc<dyn WriteStore> = Arc::clone(&self.authority) as Arc<dyn WriteStore>;
                    let mut stream =
                        BackfillStream::new(key, metadata, target, fallback.stream, synchronous);
                    let fill = stream.completion();
                    return Ok(Entry {
                        len: fallback.len,
                        stream: Box::new(stream),
                        fill,
                    });
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => debug!("fallback read for {} from child {} failed: {}", key, id.0, e),
            }
        }

        Err(Error::NotFound)
    }

    /// Hierarchical write: authority synchronously, then fan-out
    ///
    /// The authoritative write's result is the operation's result; per-child
    /// fan-out failures are logged, never propagated.
    pub async fn put(&self, key: &str, metadata: Metadata, mut data: ByteStream) -> Result<u64> {
        debug!("TieredCache::put {}", key);

        let policy = self.policy();

        // Buffer the input fully once so it can be replayed to every target.
        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        let payload = Bytes::from(buf);

        // Exclusive for the whole fan-out so the child set cannot change
        // mid-operation.
        let writers = self.writers.write().await;

        let written = self
            .authority
            .put(key, metadata.clone(), replay(&payload))
            .await?;

        if policy.write_through {
            match policy.mode {
                FanoutMode::Synchronous => {
                    let results = join_all(writers.iter().map(|(id, writer)| {
                        let metadata = metadata.clone();
                        let payload = payload.clone();
                        async move { (*id, writer.put(key, metadata, replay(&payload)).await) }
                    }))
                    .await;
                    for (id, result) in results {
                        if let Err(e) = result {
                            warn!("write-through {} to child {} failed: {}", key, id.0, e);
                        }
                    }
                }
                FanoutMode::Asynchronous => {
                    for (id, writer) in writers.iter() {
                        let id = *id;
                        let writer = Arc::clone(writer);
                        let key = key.to_string();
                        let metadata = metadata.clone();
                        let payload = payload.clone();
                        tokio::spawn(async move {
                            if let Err(e) = writer.put(&key, metadata, replay(&payload)).await {
                                warn!("write-through {} to child {} failed: {}", key, id.0, e);
                            }
                        });
                    }
                }
            }
        }

        Ok(written)
    }

    /// Hierarchical delete: authority synchronously, then fan-out
    pub async fn delete(&self, key: &str, metadata: Metadata) -> Result<()> {
        debug!("TieredCache::delete {}", key);

        let policy = self.policy();
        let writers = self.writers.write().await;

        self.authority.delete(key, metadata.clone()).await?;

        if policy.delete_through {
            match policy.mode {
                FanoutMode::Synchronous => {
                    let results = join_all(writers.iter().map(|(id, writer)| {
                        let metadata = metadata.clone();
                        async move { (*id, writer.delete(key, metadata).await) }
                    }))
                    .await;
                    for (id, result) in results {
                        if let Err(e) = result {
                            warn!("delete-through {} to child {} failed: {}", key, id.0, e);
                        }
                    }
                }
                FanoutMode::Asynchronous => {
                    for (id, writer) in writers.iter() {
                        let id = *id;
                        let writer = Arc::clone(writer);
                        let key = key.to_string();
                        let metadata = metadata.clone();
                        tokio::spawn(async move {
                            if let Err(e) = writer.delete(&key, metadata).await {
                                warn!("delete-through {} to child {} failed: {}", key, id.0, e);
                            }
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

fn replay(payload: &Bytes) -> ByteStream {
    Box::new(Cursor::new(payload.clone()))
}

#[async_trait]
impl ReadStore for TieredCache {
    async fn get(&self, key: &str, metadata: Metadata) -> Result<Entry> {
        TieredCache::get(self, key, metadata).await
    }
}

#[async_trait]
impl WriteStore for TieredCache {
    async fn put(&self, key: &str, metadata: Metadata, data: ByteStream) -> Result<u64> {
        TieredCache::put(self, key, metadata, data).await
    }

    async fn delete(&self, key: &str, metadata: Metadata) -> Result<()> {
        TieredCache::delete(self, key, metadata).await
    }
}
