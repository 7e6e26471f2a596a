//! Micro-batching write coalescer.
//!
//! Pushes are buffered for a short window and handed to a [`BatchSink`] in
//! one call. Reaching `max_batch` flushes immediately. Delivery is best
//! effort: a failed flush is logged and the batch is dropped.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Receiver of coalesced batches.
pub trait BatchSink<T>: Send + Sync + 'static {
    fn flush(&self, batch: Vec<T>) -> impl Future<Output = tabdeath_core::Result<()>> + Send;
}

pub struct MicroBatchQueue<T, S> {
    inner: Arc<Inner<T, S>>,
}

struct Inner<T, S> {
    sink: S,
    window: Duration,
    max_batch: usize,
    state: Mutex<QueueState<T>>,
}

struct QueueState<T> {
    buffer: Vec<T>,
    timer: Option<JoinHandle<()>>,
}

impl<T, S> Inner<T, S>
where
    T: Send + 'static,
    S: BatchSink<T>,
{
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn deliver(&self, batch: Vec<T>) {
        if batch.is_empty() {
            return;
        }
        let size = batch.len();
        if let Err(e) = self.sink.flush(batch).await {
            tracing::warn!(error = %e, dropped = size, "batch flush failed");
        } else {
            tracing::debug!(size, "batch flushed");
        }
    }
}

impl<T, S> MicroBatchQueue<T, S>
where
    T: Send + 'static,
    S: BatchSink<T>,
{
    pub fn new(sink: S, window: Duration, max_batch: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                window,
                max_batch: max_batch.max(1),
                state: Mutex::new(QueueState {
                    buffer: Vec::new(),
                    timer: None,
                }),
            }),
        }
    }

    /// Buffer `item`. Must be called from within a tokio runtime.
    pub fn push(&self, item: T) {
        let mut state = self.inner.lock();
        state.buffer.push(item);

        if state.buffer.len() >= self.inner.max_batch {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            let batch = std::mem::take(&mut state.buffer);
            drop(state);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.deliver(batch).await });
            return;
        }

        if state.timer.is_none() {
            let inner = Arc::clone(&self.inner);
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(inner.window).await;
                let batch = {
                    let mut state = inner.lock();
                    state.timer = None;
                    std::mem::take(&mut state.buffer)
                };
                inner.deliver(batch).await;
            }));
        }
    }

    /// Deliver whatever is buffered now and wait for the sink.
    pub async fn flush(&self) {
        let batch = {
            let mut state = self.inner.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            std::mem::take(&mut state.buffer)
        };
        self.inner.deliver(batch).await;
    }

    /// Items waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.lock().buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabdeath_core::TabDeathError;

    #[derive(Clone, Default)]
    struct Recorder {
        batches: Arc<Mutex<Vec<Vec<u32>>>>,
        fail: bool,
    }

    impl Recorder {
        fn batches(&self) -> Vec<Vec<u32>> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl BatchSink<u32> for Recorder {
        async fn flush(&self, batch: Vec<u32>) -> tabdeath_core::Result<()> {
            self.batches.lock().unwrap().push(batch);
            if self.fail {
                return Err(TabDeathError::Validation("sink down".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn pushes_within_window_flush_once() {
        let sink = Recorder::default();
        let queue = MicroBatchQueue::new(sink.clone(), Duration::from_millis(200), 100);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert!(sink.batches().is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(sink.batches(), vec![vec![1, 2, 3]]);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn max_batch_flushes_immediately() {
        let sink = Recorder::default();
        let queue = MicroBatchQueue::new(sink.clone(), Duration::from_secs(60), 3);
        for i in 0..4 {
            queue.push(i);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.batches(), vec![vec![0, 1, 2]]);
        assert_eq!(queue.pending(), 1);

        queue.flush().await;
        assert_eq!(sink.batches(), vec![vec![0, 1, 2], vec![3]]);
    }

    #[tokio::test]
    async fn failed_flush_is_swallowed() {
        let sink = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let queue = MicroBatchQueue::new(sink.clone(), Duration::from_millis(10), 100);
        queue.push(9);
        queue.flush().await;
        queue.push(10);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.batches(), vec![vec![9], vec![10]]);
    }

    #[tokio::test]
    async fn empty_flush_does_not_call_sink() {
        let sink = Recorder::default();
        let queue = MicroBatchQueue::new(sink.clone(), Duration::from_millis(10), 100);
        queue.flush().await;
        assert!(sink.batches().is_empty());
    }
}
