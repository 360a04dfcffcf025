//! Store contract shared by every cache tier
//!
//! The rest of the system is written only against these capability traits:
//! a tier is readable, writable, or both, and the composition engine files
//! each registered child into the matching list(s) at registration time.

use crate::backfill::FillHandle;
use crate::error::Result;
use async_trait::async_trait;
use std::any::Any;
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Opaque byte stream returned by reads and consumed by writes
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opaque per-call context passed unchanged from caller to store
///
/// Stores that ignore it simply drop it. A store may require a concrete
/// shape (the HTTP origin wants an `http::HeaderMap`) and fails with
/// [`Error::InvalidMetadata`](crate::Error::InvalidMetadata) when the shape
/// is absent.
pub type Metadata = Option<Arc<dyn Any + Send + Sync>>;

/// Wrap a value as per-call metadata
pub fn metadata<T: Any + Send + Sync>(value: T) -> Metadata {
    Some(Arc::new(value))
}

/// Borrow metadata as a concrete type, if it was provided with that shape
pub fn metadata_as<T: Any>(metadata: &Metadata) -> Option<&T> {
    metadata.as_deref().and_then(<dyn Any + Send + Sync>::downcast_ref)
}

/// The result of a successful read against a tier
pub struct Entry {
    /// Declared length in bytes, or `None` when the length cannot be known
    /// before the stream is fully consumed.
    pub len: Option<u64>,
    /// The data itself.
    pub stream: ByteStream,
    /// Completion handle for a backfill attached to this read, when the
    /// entry was served by a fallback tier in asynchronous fan-out mode.
    pub fill: Option<FillHandle>,
}

impl Entry {
    /// Create an entry from a stream with an optionally declared length
    pub fn new(len: Option<u64>, stream: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            len,
            stream: Box::new(stream),
            fill: None,
        }
    }

    /// Create an entry over an in-memory payload
    pub fn from_bytes(data: bytes::Bytes) -> Self {
        let len = data.len() as u64;
        Self::new(Some(len), Cursor::new(data))
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("len", &self.len)
            .field("fill", &self.fill.is_some())
            .finish_non_exhaustive()
    }
}

/// A tier that can serve reads
#[async_trait]
pub trait ReadStore: Send + Sync {
    /// Fetch the entry stored under `key`.
    ///
    /// A legitimate miss must be reported as
    /// [`Error::NotFound`](crate::Error::NotFound), never as a generic I/O
    /// error.
    async fn get(&self, key: &str, metadata: Metadata) -> Result<Entry>;
}

/// A tier that can accept writes and deletes
#[async_trait]
pub trait WriteStore: Send + Sync {
    /// Store `data` under `key`, returning the number of bytes written.
    async fn put(&self, key: &str, metadata: Metadata, data: ByteStream) -> Result<u64>;

    /// Remove `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str, metadata: Metadata) -> Result<()>;
}

/// A tier that serves both reads and writes
pub trait Store: ReadStore + WriteStore {}

impl<T: ReadStore + WriteStore> Store for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_downcast() {
        let meta = metadata(42u32);
        assert_eq!(metadata_as::<u32>(&meta), Some(&42));
        assert_eq!(metadata_as::<String>(&meta), None);
        assert_eq!(metadata_as::<u32>(&None), None);
    }

    #[tokio::test]
    async fn test_entry_from_bytes() {
        use tokio::io::AsyncReadExt;

        let mut entry = Entry::from_bytes(bytes::Bytes::from_static(b"hello"));
        assert_eq!(entry.len, Some(5));
        assert!(entry.fill.is_none());

        let mut buf = Vec::new();
        entry.stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }
}
