//! Backfill-on-read stream
//!
//! Wraps a stream served by a slower tier so that, as the caller drains it,
//! a full copy is captured and written into the faster tier. The caller is
//! never charged for the repopulation unless the stream was built in
//! synchronous mode, in which case the read that observes end-of-stream
//! waits for the fill to land before returning.

use crate::store::{ByteStream, Metadata, WriteStore};
use bytes::BytesMut;
use std::future::Future;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bounded wait applied by [`FillHandle::outcome`] so that observing a
/// detached fill can never block forever if the fill task stalls.
const FILL_WAIT: Duration = Duration::from_secs(5);

/// Terminal state of one backfill attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillOutcome {
    /// The fill landed; carries the byte count the target reported.
    Committed(u64),
    /// The fill ran and failed, or never ran because the stream was
    /// dropped before reaching end-of-stream.
    Failed,
    /// The fill did not complete within the bounded wait window.
    TimedOut,
}

/// Single-consumer completion slot for a detached fill
///
/// Consumed by value: the outcome of one fill can be observed once.
#[derive(Debug)]
pub struct FillHandle {
    rx: oneshot::Receiver<FillOutcome>,
}

impl FillHandle {
    /// Wait for the fill to finish, up to a few seconds
    pub async fn outcome(self) -> FillOutcome {
        self.outcome_within(FILL_WAIT).await
    }

    /// Wait for the fill to finish, up to `wait`
    pub async fn outcome_within(self, wait: Duration) -> FillOutcome {
        match tokio::time::timeout(wait, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            // The stream was dropped before a fill task was ever spawned.
            Ok(Err(_)) => FillOutcome::Failed,
            Err(_) => FillOutcome::TimedOut,
        }
    }
}

enum FillState {
    /// Still serving bytes from the source.
    Streaming,
    /// Source exhausted, synchronous fill in flight.
    Draining(JoinHandle<()>),
    /// Terminal; every further read is a clean EOF.
    Finished,
}

/// Stream that tees a fallback read into a faster tier
///
/// Every read is served from the source and simultaneously appended to an
/// internal buffer. When the source reports end-of-stream, one fill task is
/// spawned to `put` the buffered copy into the target store. Fill failures
/// are logged and reported through the [`FillHandle`], never to the stream
/// consumer, who already has the data.
pub struct BackfillStream {
    key: String,
    metadata: Metadata,
    target: Arc<dyn WriteStore>,
    source: ByteStream,
    buffer: BytesMut,
    synchronous: bool,
    state: FillState,
    tx: Option<oneshot::Sender<FillOutcome>>,
    handle: Option<FillHandle>,
}

impl BackfillStream {
    /// Tee `source` into `target` under `key`
    ///
    /// With `synchronous` set, the read observing end-of-stream blocks
    /// until the fill completes, guaranteeing read-after-write consistency
    /// against the target on the same call path.
    pub fn new(
        key: impl Into<String>,
        metadata: Metadata,
        target: Arc<dyn WriteStore>,
        source: ByteStream,
        synchronous: bool,
    ) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            key: key.into(),
            metadata,
            target,
            source,
            buffer: BytesMut::new(),
            synchronous,
            state: FillState::Streaming,
            tx: Some(tx),
            handle: Some(FillHandle { rx }),
        }
    }

    /// Take the completion handle for the eventual fill
    ///
    /// Returns `None` if it was already taken; there is exactly one.
    pub fn completion(&mut self) -> Option<FillHandle> {
        self.handle.take()
    }

    fn spawn_fill(&mut self) -> JoinHandle<()> {
        let key = self.key.clone();
        let metadata = self.metadata.clone();
        let target = Arc::clone(&self.target);
        let payload = self.buffer.split().freeze();
        let tx = self.tx.take();

        debug!("backfill {}: end of stream after {} bytes", key, payload.len());

        tokio::spawn(async move {
            let data: ByteStream = Box::new(Cursor::new(payload));
            let outcome = match target.put(&key, metadata, data).await {
                Ok(written) => FillOutcome::Committed(written),
                Err(e) => {
                    warn!("backfill {}: fill failed: {}", key, e);
                    FillOutcome::Failed
                }
            };
            if let Some(tx) = tx {
                // Nobody listening is fine; the outcome is also logged.
                let _ = tx.send(outcome);
            }
        })
    }
}

impl AsyncRead for BackfillStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            match this.state {
                FillState::Finished => return Poll::Ready(Ok(())),

                FillState::Draining(ref mut task) => match Pin::new(task).poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(joined) => {
                        if let Err(e) = joined {
                            warn!("backfill {}: fill task aborted: {}", this.key, e);
                        }
                        this.state = FillState::Finished;
                        return Poll::Ready(Ok(()));
                    }
                },

                FillState::Streaming => {
                    if buf.remaining() == 0 {
                        return Poll::Ready(Ok(()));
                    }

                    let before = buf.filled().len();
                    match Pin::new(&mut this.source).poll_read(cx, buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                        Poll::Ready(Ok(())) => {
                            let read = buf.filled().len() - before;
                            if read > 0 {
                                this.buffer.extend_from_slice(&buf.filled()[before..]);
                                return Poll::Ready(Ok(()));
                            }

                            let task = this.spawn_fill();
                            if this.synchronous {
                                this.state = FillState::Draining(task);
                                // Poll the fill before reporting EOF.
                            } else {
                                this.state = FillState::Finished;
                                return Poll::Ready(Ok(()));
                            }
                        }
                    }
                }
            }
        }
    }
}
