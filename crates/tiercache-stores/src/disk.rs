//! Filesystem store with staged writes and atomic commit
//!
//! Writes stream into a uniquely named file under a staging root and are
//! committed into the cache root with a rename, so a reader can never
//! observe a partially written entry. Transient filesystem errors (a file
//! briefly locked by a scanner, for instance) are retried a bounded number
//! of times with a fixed delay.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tiercache_core::{ByteStream, Entry, Error, Metadata, ReadStore, Result, VerifiedReader, WriteStore};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

const FS_MAX_ATTEMPTS: u32 = 3;
const FS_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Disk-backed read/write store
pub struct DiskStore {
    /// Cache root; keys resolve to paths beneath it.
    root: PathBuf,
    /// Staging root for in-flight writes, ideally on the same filesystem
    /// as `root` so the commit rename stays atomic.
    staging: PathBuf,
    max_attempts: u32,
    retry_delay: Duration,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging: staging.into(),
            max_attempts: FS_MAX_ATTEMPTS,
            retry_delay: FS_RETRY_DELAY,
        }
    }

    /// Override the bounded retry policy for transient filesystem errors
    pub fn with_retry_policy(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Move a staged file into place, retrying transient rename failures
    async fn commit(&self, staged: &Path, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut attempt = 0;
        loop {
            match fs::rename(staged, dest).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        let _ = fs::remove_file(staged).await;
                        return Err(e.into());
                    }
                    debug!("commit {:?} failed (attempt {}): {}", dest, attempt, e);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl ReadStore for DiskStore {
    async fn get(&self, key: &str, _metadata: Metadata) -> Result<Entry> {
        let full = self.root.join(key);
        debug!("DiskStore::get {:?}", full);

        let mut attempt = 0;
        loop {
            match fs::File::open(&full).await {
                Ok(file) => {
                    let len = file.metadata().await?.len();
                    debug!("returning reader for {} (len {})", key, len);
                    return Ok(Entry::new(
                        Some(len),
                        VerifiedReader::new(Some(len), file),
                    ));
                }
                // A missing file is a legitimate miss, never retried.
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::NotFound),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(e.into());
                    }
                    debug!("open {} failed (attempt {}): {}", key, attempt, e);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl WriteStore for DiskStore {
    async fn put(&self, key: &str, _metadata: Metadata, mut data: ByteStream) -> Result<u64> {
        debug!("DiskStore::put {}", key);

        fs::create_dir_all(&self.staging).await?;
        let staged = self.staging.join(Uuid::new_v4().to_string());

        let mut file = fs::File::create(&staged).await?;
        let written = match tokio::io::copy(&mut data, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&staged).await;
                return Err(e.into());
            }
        };
        drop(file);

        self.commit(&staged, &self.root.join(key)).await?;
        Ok(written)
    }

    async fn delete(&self, key: &str, _metadata: Metadata) -> Result<()> {
        let full = self.root.join(key);
        debug!("DiskStore::delete {:?}", full);

        let mut attempt = 0;
        loop {
            match fs::remove_file(&full).await {
                Ok(()) => return Ok(()),
                // Deleting an absent entry is not an error.
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(e.into());
                    }
                    debug!("delete {} failed (attempt {}): {}", key, attempt, e);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}
