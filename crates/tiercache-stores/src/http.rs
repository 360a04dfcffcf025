//! Read-only HTTP origin
//!
//! Keys are full request URLs. The per-call metadata must carry an
//! `http::HeaderMap` of request headers to forward (an authenticated origin
//! is the normal case); a missing or differently shaped metadata value is a
//! distinct configuration error, not a miss.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use http::HeaderMap;
use std::io;
use std::time::Duration;
use tiercache_core::{Entry, Error, Metadata, ReadStore, Result, VerifiedReader, metadata_as};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

pub(crate) const HTTP_MAX_ATTEMPTS: u32 = 3;
pub(crate) const HTTP_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Issue a GET with bounded retries on transport errors and 5xx statuses
///
/// Non-5xx responses (including 4xx) are returned to the caller for
/// interpretation; retrying a well-formed rejection would not help.
pub(crate) async fn fetch_with_retries(
    client: &reqwest::Client,
    url: &str,
    headers: Option<&HeaderMap>,
    max_attempts: u32,
    retry_delay: Duration,
) -> Result<reqwest::Response> {
    let mut attempt = 0;
    loop {
        attempt += 1;

        let mut request = client.get(url);
        if let Some(headers) = headers {
            request = request.headers(headers.clone());
        }

        match request.send().await {
            Ok(response) if !response.status().is_server_error() => return Ok(response),
            Ok(response) => {
                debug!("GET {}: status {} (attempt {})", url, response.status(), attempt);
                if attempt >= max_attempts {
                    return Err(Error::UpstreamStatus(response.status().as_u16()));
                }
            }
            Err(e) => {
                debug!("GET {}: {} (attempt {})", url, e, attempt);
                if attempt >= max_attempts {
                    return Err(Error::upstream(e.to_string()));
                }
            }
        }

        tokio::time::sleep(retry_delay).await;
    }
}

/// Turn a response body back into an `AsyncRead`
pub(crate) fn body_reader(response: reqwest::Response) -> impl AsyncRead + Send + Unpin {
    let stream: BoxStream<'static, io::Result<Bytes>> =
        Box::pin(response.bytes_stream().map_err(io::Error::other));
    StreamReader::new(stream)
}

/// Read-only store backed by an HTTP origin
pub struct HttpReadStore {
    client: reqwest::Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpReadStore {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
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
}

impl Default for HttpReadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadStore for HttpReadStore {
    async fn get(&self, key: &str, metadata: Metadata) -> Result<Entry> {
        debug!("HttpReadStore::get {}", key);

        let headers = metadata_as::<HeaderMap>(&metadata).ok_or(Error::InvalidMetadata {
            expected: "http::HeaderMap",
        })?;

        let response = fetch_with_retries(
            &self.client,
            key,
            Some(headers),
            self.max_attempts,
            self.retry_delay,
        )
        .await?;

        if response.status().as_u16() >= 400 {
            debug!("GET {}: status {}", key, response.status());
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
