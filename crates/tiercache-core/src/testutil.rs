//! Shared test fixtures for the engine modules

use crate::error::{Error, Result};
use crate::store::{ByteStream, Entry, Metadata, ReadStore, WriteStore};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Minimal map-backed read/write store for exercising the engines.
#[derive(Default)]
pub struct MapStore {
    entries: RwLock<HashMap<String, Bytes>>,
    fail_puts: AtomicBool,
}

impl MapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent put fail with a storage error.
    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub fn bytes(&self, key: &str) -> Option<Bytes> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.entries
            .write()
            .insert(key.to_string(), Bytes::copy_from_slice(data));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[async_trait]
impl ReadStore for MapStore {
    async fn get(&self, key: &str, _metadata: Metadata) -> Result<Entry> {
        let data = self.entries.read().get(key).cloned().ok_or(Error::NotFound)?;
        Ok(Entry::from_bytes(data))
    }
}

#[async_trait]
impl WriteStore for MapStore {
    async fn put(&self, key: &str, _metadata: Metadata, mut data: ByteStream) -> Result<u64> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::storage("injected put failure"));
        }
        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        let written = buf.len() as u64;
        self.entries.write().insert(key.to_string(), Bytes::from(buf));
        Ok(written)
    }

    async fn delete(&self, key: &str, _metadata: Metadata) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Write store whose puts never complete; for timeout paths.
pub struct StallStore;

#[async_trait]
impl WriteStore for StallStore {
    async fn put(&self, _key: &str, _metadata: Metadata, _data: ByteStream) -> Result<u64> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(0)
    }

    async fn delete(&self, _key: &str, _metadata: Metadata) -> Result<()> {
        Ok(())
    }
}

/// Store whose every operation fails with a storage error.
pub struct FailStore;

#[async_trait]
impl ReadStore for FailStore {
    async fn get(&self, _key: &str, _metadata: Metadata) -> Result<Entry> {
        Err(Error::storage("injected get failure"))
    }
}

#[async_trait]
impl WriteStore for FailStore {
    async fn put(&self, _key: &str, _metadata: Metadata, _data: ByteStream) -> Result<u64> {
        Err(Error::storage("injected put failure"))
    }

    async fn delete(&self, _key: &str, _metadata: Metadata) -> Result<()> {
        Err(Error::storage("injected delete failure"))
    }
}

/// Drain a reader to a vector.
pub async fn read_all<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}
