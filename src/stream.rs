//! Streaming query pipeline.
//!
//! A store drains every matching row's raw payload into an owned buffer while
//! it still holds its connection, releases the cursor, and then hands that
//! buffer to a producer task here. The producer decodes one entry at a time
//! and yields to the scheduler between entries; the consumer pulls items
//! through [`QueryStream`], which implements [`futures::Stream`].
//!
//! The whole result set is materialized before the first item is decoded, so
//! this does not bound memory and does not make the first item arrive sooner.
//! What it buys is a lazy, cancellable sequence with decode work spread across
//! scheduler turns.

use crate::codec::Codec;
use crate::error::{StoreError, StoreResult};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::task::AtomicWaker;
use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Undecoded payloads drained from one query
pub type RawRecords = Vec<Vec<u8>>;

/// How a [`QueryStream`] buffers items and treats bad records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Maximum decoded-but-unconsumed items; when full the oldest is dropped.
    /// `None` keeps everything.
    pub buffer_size: Option<usize>,
    /// Skip records that fail to decode instead of ending the stream.
    pub continue_on_record_fail: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer_size: None,
            continue_on_record_fail: true,
        }
    }
}

impl StreamOptions {
    pub fn bounded(buffer_size: usize) -> Self {
        Self {
            buffer_size: Some(buffer_size),
            ..Self::default()
        }
    }

    pub fn fail_fast(mut self) -> Self {
        self.continue_on_record_fail = false;
        self
    }
}

/// A record that could not be decoded, by its position in the drained result.
#[derive(Debug)]
pub struct RecordFailure {
    pub index: usize,
    pub error: StoreError,
}

/// Items decoded from a full scan, plus the records that were skipped.
#[derive(Debug)]
pub struct ScanReport<T> {
    pub items: Vec<T>,
    pub failures: Vec<RecordFailure>,
}

/// Decode every buffered record, skipping and collecting failures.
pub(crate) fn decode_all<T, C: Codec<T>>(store: &str, codec: &C, raw: RawRecords) -> ScanReport<T> {
    let mut items = Vec::with_capacity(raw.len());
    let mut failures = Vec::new();
    for (index, bytes) in raw.into_iter().enumerate() {
        match codec.decode(&bytes) {
            Ok(item) => items.push(item),
            Err(error) => {
                warn!(store, index, error = %error, "Skipping record that failed to decode");
                failures.push(RecordFailure { index, error });
            }
        }
    }
    ScanReport { items, failures }
}

struct Shared<T> {
    buffer: Mutex<Buffer<T>>,
    waker: AtomicWaker,
    cancelled: AtomicBool,
}

struct Buffer<T> {
    ready: VecDeque<T>,
    capacity: Option<usize>,
    finished: bool,
}

enum Next<T> {
    Item(T),
    Finished,
    Empty,
}

impl<T> Shared<T> {
    fn push(&self, item: T) -> bool {
        let mut buffer = self.buffer.lock();
        let mut dropped = false;
        if let Some(capacity) = buffer.capacity {
            if capacity == 0 {
                return true;
            }
            while buffer.ready.len() >= capacity {
                buffer.ready.pop_front();
                dropped = true;
            }
        }
        buffer.ready.push_back(item);
        drop(buffer);
        self.waker.wake();
        dropped
    }

    fn finish(&self) {
        self.buffer.lock().finished = true;
        self.waker.wake();
    }

    fn next(&self) -> Next<T> {
        let mut buffer = self.buffer.lock();
        match buffer.ready.pop_front() {
            Some(item) => Next::Item(item),
            None if buffer.finished => Next::Finished,
            None => Next::Empty,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Lazily decoded results of a store query.
///
/// Decode failures are reported on the channel returned by
/// [`take_failures`](QueryStream::take_failures). Dropping the stream cancels
/// the producer.
pub struct QueryStream<T> {
    shared: Arc<Shared<T>>,
    failures: Option<UnboundedReceiver<RecordFailure>>,
}

impl<T: Send + 'static> QueryStream<T> {
    /// Start decoding `raw` on the current Tokio runtime.
    pub(crate) fn spawn<C: Codec<T>>(
        store: String,
        raw: RawRecords,
        codec: Arc<C>,
        options: StreamOptions,
    ) -> StoreResult<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| StoreError::Runtime(e.to_string()))?;

        let shared = Arc::new(Shared {
            buffer: Mutex::new(Buffer {
                ready: VecDeque::new(),
                capacity: options.buffer_size,
                finished: false,
            }),
            waker: AtomicWaker::new(),
            cancelled: AtomicBool::new(false),
        });
        let (failures_tx, failures_rx) = unbounded();

        debug!(store = %store, records = raw.len(), ?options, "Starting query stream");
        handle.spawn(produce(
            store,
            raw,
            codec,
            options.continue_on_record_fail,
            Arc::clone(&shared),
            failures_tx,
        ));

        Ok(Self {
            shared,
            failures: Some(failures_rx),
        })
    }
}

impl<T> QueryStream<T> {
    /// Take the decode-failure side channel. It closes when the producer stops.
    pub fn take_failures(&mut self) -> Option<UnboundedReceiver<RecordFailure>> {
        self.failures.take()
    }

    /// Stop decoding. Undecoded records are discarded and nothing more is yielded.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        self.shared.waker.wake();
    }

    /// True once the producer has stopped, whether or not items remain unconsumed.
    pub fn is_producer_done(&self) -> bool {
        self.shared.buffer.lock().finished
    }
}

impl<T> Stream for QueryStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let shared = &self.shared;
        if shared.is_cancelled() {
            return Poll::Ready(None);
        }
        match shared.next() {
            Next::Item(item) => return Poll::Ready(Some(item)),
            Next::Finished => return Poll::Ready(None),
            Next::Empty => {}
        }

        shared.waker.register(cx.waker());

        // The producer may have pushed between the check and the registration.
        match shared.next() {
            Next::Item(item) => Poll::Ready(Some(item)),
            Next::Finished => Poll::Ready(None),
            Next::Empty => Poll::Pending,
        }
    }
}

impl<T> Drop for QueryStream<T> {
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }
}

/// Marks the stream finished when the producer stops, including by panic or abort.
struct FinishOnDrop<T>(Arc<Shared<T>>);

impl<T> Drop for FinishOnDrop<T> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

async fn produce<T, C: Codec<T>>(
    store: String,
    raw: RawRecords,
    codec: Arc<C>,
    continue_on_record_fail: bool,
    shared: Arc<Shared<T>>,
    failures: UnboundedSender<RecordFailure>,
) {
    let _finish = FinishOnDrop(Arc::clone(&shared));
    let total = raw.len();
    let mut yielded = 0usize;
    let mut dropped = 0usize;

    for (index, bytes) in raw.into_iter().enumerate() {
        if shared.is_cancelled() {
            debug!(store = %store, discarded = total - index, "Query stream cancelled");
            break;
        }

        match codec.decode(&bytes) {
            Ok(item) => {
                yielded += 1;
                if shared.push(item) {
                    dropped += 1;
                }
            }
            Err(error) => {
                warn!(store = %store, index, error = %error, "Record failed to decode");
                let _ = failures.unbounded_send(RecordFailure { index, error });
                if !continue_on_record_fail {
                    debug!(store = %store, index, "Ending query stream after record failure");
                    break;
                }
            }
        }

        tokio::task::yield_now().await;
    }

    debug!(store = %store, yielded, dropped, "Query stream producer finished");
}
