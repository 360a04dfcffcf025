//! Read-only pass-through over local filesystem paths

use async_trait::async_trait;
use std::io;
use tiercache_core::{Entry, Error, Metadata, ReadStore, Result, VerifiedReader};
use tokio::fs;
use tracing::debug;

/// Read-only store that treats keys as filesystem paths
///
/// Useful as the slowest local tier of a hierarchy, serving pre-existing
/// files that were never written through the cache.
#[derive(Default)]
pub struct FsReadStore;

impl FsReadStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReadStore for FsReadStore {
    async fn get(&self, key: &str, _metadata: Metadata) -> Result<Entry> {
        debug!("FsReadStore::get {}", key);

        let file = match fs::File::open(key).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::NotFound),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        debug!("returning reader for {} (len {})", key, len);
        Ok(Entry::new(Some(len), VerifiedReader::new(Some(len), file)))
    }
}
