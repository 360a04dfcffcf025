//! Length-verified, self-releasing stream wrapper
//!
//! Every stream handed out by a tier passes through [`VerifiedReader`] so
//! that silent truncation (a network read cut short, a partially written
//! file) turns into an observable failure, and so that the underlying
//! resources are released exactly once when the stream is drained.

use crate::error::Error;
use crate::store::ByteStream;
use std::any::Any;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Read stream that verifies its declared length at end-of-stream
///
/// The wrapper owns the source stream and, optionally, one companion
/// resource (an open file handle behind a decoder, for example) that must
/// live as long as the stream. Both are dropped the moment end-of-stream is
/// observed; reads after that point yield a clean EOF with no side effects.
pub struct VerifiedReader {
    declared: Option<u64>,
    consumed: u64,
    source: Option<ByteStream>,
    resource: Option<Box<dyn Any + Send>>,
}

impl VerifiedReader {
    /// Wrap `source`, verifying `declared` bytes at end-of-stream
    ///
    /// Pass `None` when the length cannot be known before full consumption;
    /// no verification happens in that case.
    pub fn new(declared: Option<u64>, source: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            declared,
            consumed: 0,
            source: Some(Box::new(source)),
            resource: None,
        }
    }

    /// Wrap `source` together with a companion resource released at the
    /// same time as the source
    pub fn with_resource(
        declared: Option<u64>,
        source: impl AsyncRead + Send + Unpin + 'static,
        resource: impl Any + Send,
    ) -> Self {
        Self {
            declared,
            consumed: 0,
            source: Some(Box::new(source)),
            resource: Some(Box::new(resource)),
        }
    }

    /// Number of bytes delivered to the consumer so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Declared length, if one was provided at construction
    pub fn declared(&self) -> Option<u64> {
        self.declared
    }
}

impl AsyncRead for VerifiedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        let Some(source) = this.source.as_mut() else {
            // Already exhausted and released.
            return Poll::Ready(Ok(()));
        };

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        match Pin::new(source).poll_read(cx, buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {
                let read = buf.filled().len() - before;
                if read > 0 {
                    this.consumed += read as u64;
                    return Poll::Ready(Ok(()));
                }

                // End of stream: release the source and its companion
                // resource before reporting anything to the caller.
                this.source = None;
                this.resource = None;

                if let Some(expected) = this.declared {
                    if this.consumed != expected {
                        let err = Error::SizeMismatch {
                            expected,
                            actual: this.consumed,
                        };
                        return Poll::Ready(Err(err.into()));
                    }
                }

                Poll::Ready(Ok(()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    /// Increments a shared counter when dropped.
    struct DropGuard(Arc<AtomicUsize>);

    impl Drop for DropGuard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_exact_length_passes() {
        let mut reader = VerifiedReader::new(Some(5), Cursor::new(b"hello".to_vec()));

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(reader.consumed(), 5);
    }

    #[tokio::test]
    async fn test_unknown_length_passes() {
        let mut reader = VerifiedReader::new(None, Cursor::new(vec![7u8; 4096]));

        let mut out = Vec::new();
        let n = reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(n, 4096);
    }

    #[tokio::test]
    async fn test_truncated_source_reports_mismatch() {
        // Declares 10 bytes but delivers 5. The bytes already read stay
        // valid; the terminal read fails instead of reporting a clean EOF.
        let mut reader = VerifiedReader::new(Some(10), Cursor::new(b"hello".to_vec()));

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_overlong_source_reports_mismatch() {
        let mut reader = VerifiedReader::new(Some(2), Cursor::new(b"hello".to_vec()));

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_eof_is_idempotent() {
        let mut reader = VerifiedReader::new(Some(3), Cursor::new(b"abc".to_vec()));

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();

        // Any number of further reads yields EOF with no error.
        let mut buf = [0u8; 16];
        for _ in 0..3 {
            assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_resources_released_once_at_eof() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut reader = VerifiedReader::with_resource(
            Some(3),
            Cursor::new(b"abc".to_vec()),
            DropGuard(drops.clone()),
        );

        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0, "released before EOF");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        // Reads past EOF must not release anything again.
        let mut scratch = [0u8; 8];
        reader.read(&mut scratch).await.unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
