//! Map-backed in-memory store

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Cursor;
use tiercache_core::{ByteStream, Entry, Error, Metadata, ReadStore, Result, VerifiedReader, WriteStore};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// In-memory read/write store
///
/// Typically used as the authoritative tier of a hierarchy, with slower
/// tiers registered behind it.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

#[async_trait]
impl ReadStore for MemoryStore {
    async fn get(&self, key: &str, _metadata: Metadata) -> Result<Entry> {
        debug!("MemoryStore::get {}", key);

        let data = self
            .entries
            .read()
            .get(key)
            .cloned()
            .ok_or(Error::NotFound)?;

        let len = data.len() as u64;
        debug!("returning reader for {} (len {})", key, len);
        Ok(Entry::new(
            Some(len),
            VerifiedReader::new(Some(len), Cursor::new(data)),
        ))
    }
}

#[async_trait]
impl WriteStore for MemoryStore {
    async fn put(&self, key: &str, _metadata: Metadata, mut data: ByteStream) -> Result<u64> {
        debug!("MemoryStore::put {}", key);

        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        let written = buf.len() as u64;

        self.entries
            .write()
            .insert(key.to_string(), Bytes::from(buf));

        Ok(written)
    }

    async fn delete(&self, key: &str, _metadata: Metadata) -> Result<()> {
        debug!("MemoryStore::delete {}", key);

        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(data: &[u8]) -> ByteStream {
        Box::new(Cursor::new(data.to_vec()))
    }

    async fn drain(entry: &mut Entry) -> Vec<u8> {
        let mut buf = Vec::new();
        entry.stream.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryStore::new();

        let written = store.put("k", None, stream(b"value")).await.unwrap();
        assert_eq!(written, 5);

        let mut entry = store.get("k", None).await.unwrap();
        assert_eq!(entry.len, Some(5));
        assert_eq!(drain(&mut entry).await, b"value");
    }

    #[tokio::test]
    async fn test_miss_is_not_found() {
        let store = MemoryStore::new();
        assert!(store.get("absent", None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put("k", None, stream(b"v")).await.unwrap();

        store.delete("k", None).await.unwrap();
        assert!(!store.contains("k"));

        // Absent key is not an error.
        store.delete("k", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = MemoryStore::new();
        store.put("k", None, stream(b"old")).await.unwrap();
        store.put("k", None, stream(b"newer")).await.unwrap();

        let mut entry = store.get("k", None).await.unwrap();
        assert_eq!(drain(&mut entry).await, b"newer");
        assert_eq!(store.len(), 1);
    }
}
