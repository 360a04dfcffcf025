//! Read-only object storage origin
//!
//! Builds blob URLs from an endpoint and container and fetches them over
//! HTTP. Some older upload paths lowercased keys on ingest, so a miss on
//! the exact key is retried once with the lowercased form before being
//! reported as missing.

use async_trait::async_trait;
use http::HeaderMap;
use std::time::Duration;
use tiercache_core::{Entry, Error, Metadata, ReadStore, Result, VerifiedReader, metadata_as};
use tracing::debug;

use crate::http::{HTTP_MAX_ATTEMPTS, HTTP_RETRY_DELAY, body_reader, fetch_with_retries};

/// Read-only store backed by a single object storage container
pub struct ObjectReadStore {
    client: reqwest::Client,
    endpoint: String,
    container: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ObjectReadStore {
    pub fn new(endpoint: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            container: container.into(),
            max_attempts: HTTP_MAX_ATTEMPTS,
            retry_delay: HTTP_RETRY_DELAY,
        }
    }

    /// Override the bounded retry policy
    pub fn with_retry_policy(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    fn blob_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.container,
            key
        )
    }

    async fn fetch(&self, key: &str, headers: Option<&HeaderMap>) -> Result<Entry> {
        let url = self.blob_url(key);
        let response = fetch_with_retries(
            &self.client,
            &url,
            headers,
            self.max_attempts,
            self.retry_delay,
        )
        .await?;

        if response.status().as_u16() >= 400 {
            debug!("GET {}: status {}", url, response.status());
            return Err(Error::NotFound);
        }

        let len = response.content_length();
        debug!("returning reader for {} (len {:?})", key, len);
        Ok(Entry::new(
            len,
            VerifiedReader::new(len, body_reader(response)),
        ))
    }
}

#[async_trait]
impl ReadStore for ObjectReadStore {
    async fn get(&self, key: &str, metadata: Metadata) -> Result<Entry> {
        debug!("ObjectReadStore::get {}/{}", self.container, key);

        // Headers are optional here; a public container needs none.
        let headers = metadata_as::<HeaderMap>(&metadata);

        match self.fetch(key, headers).await {
            Ok(entry) => Ok(entry),
            Err(Error::NotFound) => {
                let lowered = key.to_lowercase();
                if lowered == key {
                    return Err(Error::NotFound);
                }
                debug!("retrying {} as {}", key, lowered);
                self.fetch(&lowered, headers).await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testserver;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    fn fast_store(base: &str) -> ObjectReadStore {
        ObjectReadStore::new(base, "blobs").with_retry_policy(2, Duration::from_millis(10))
    }

    async fn drain(entry: &mut Entry) -> Vec<u8> {
        let mut buf = Vec::new();
        entry.stream.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_fetches_blob_from_container() {
        let base = testserver::spawn(Arc::new(|path: &str| {
            if path == "/blobs/dir/test.file" {
                (200, b"blob bytes".to_vec())
            } else {
                (404, Vec::new())
            }
        }))
        .await;

        let store = fast_store(&base);
        let mut entry = store.get("dir/test.file", None).await.unwrap();

        assert_eq!(entry.len, Some(10));
        assert_eq!(drain(&mut entry).await, b"blob bytes");
    }

    #[tokio::test]
    async fn test_falls_back_to_lowercased_key() {
        let base = testserver::spawn(Arc::new(|path: &str| {
            if path == "/blobs/dir/file.dat" {
                (200, b"lowered".to_vec())
            } else {
                (404, Vec::new())
            }
        }))
        .await;

        let store = fast_store(&base);
        let mut entry = store.get("Dir/File.DAT", None).await.unwrap();
        assert_eq!(drain(&mut entry).await, b"lowered");
    }

    #[tokio::test]
    async fn test_lowercase_key_misses_without_second_probe() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let base = testserver::spawn(Arc::new(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            (404, Vec::new())
        }))
        .await;

        let store = fast_store(&base);
        let err = store.get("already/lower", None).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mixed_case_miss_probes_both_forms() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let base = testserver::spawn(Arc::new(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            (404, Vec::new())
        }))
        .await;

        let store = fast_store(&base);
        let err = store.get("Mixed/Case", None).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
