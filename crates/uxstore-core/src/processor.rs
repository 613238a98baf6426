// ── Data processor ──
//
// Current-value holder bridging store pushes to pull reads. Holds a
// default until the first `on_next`, replays the current value to each
// new stream, then forwards every later update.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

use crate::sync::lock;

/// A replayable current-value cell with update streams.
pub struct DataProcessor<T> {
    inner: Arc<ProcessorInner<T>>,
}

struct ProcessorInner<T> {
    current: ArcSwap<T>,
    state: Mutex<ProcessorState<T>>,
}

struct ProcessorState<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    completed: bool,
}

impl<T> Clone for DataProcessor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> DataProcessor<T> {
    /// A processor holding `default` until the first update.
    pub fn create(default: T) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                current: ArcSwap::from_pointee(default),
                state: Mutex::new(ProcessorState {
                    subscribers: Vec::new(),
                    completed: false,
                }),
            }),
        }
    }

    /// Replace the current value and forward it to every live stream.
    /// Ignored once the processor is completed.
    pub fn on_next(&self, value: T) {
        let mut state = lock(&self.inner.state);
        if state.completed {
            trace!("update after completion ignored");
            return;
        }
        self.inner.current.store(Arc::new(value.clone()));
        state.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
    }

    /// The current value.
    pub fn value(&self) -> T {
        T::clone(&self.inner.current.load())
    }

    /// The current value without cloning the payload.
    pub fn load(&self) -> Arc<T> {
        self.inner.current.load_full()
    }

    /// A stream that yields the current value, then every later update.
    pub fn to_stream(&self) -> ProcessorStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.inner.state);
        let _ = tx.send(self.value());
        if !state.completed {
            state.subscribers.push(tx);
        }
        ProcessorStream {
            inner: UnboundedReceiverStream::new(rx),
        }
    }

    /// End every live stream. Later streams replay the last value and end.
    pub fn complete(&self) {
        let mut state = lock(&self.inner.state);
        state.completed = true;
        state.subscribers.clear();
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.inner.state).completed
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.state)
            .subscribers
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for DataProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProcessor")
            .field("value", &self.load())
            .finish_non_exhaustive()
    }
}

/// Update stream returned by [`DataProcessor::to_stream`].
pub struct ProcessorStream<T> {
    inner: UnboundedReceiverStream<T>,
}

impl<T> Stream for ProcessorStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio_stream::StreamExt;

    use super::*;

    #[test]
    fn value_starts_at_default() {
        let processor = DataProcessor::create(0.0_f64);
        assert!(processor.value().abs() < f64::EPSILON);
        processor.on_next(12.5);
        assert!((processor.value() - 12.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn stream_replays_current_then_forwards() {
        let processor = DataProcessor::create(String::from("none"));
        processor.on_next("first".into());

        let mut stream = processor.to_stream();
        processor.on_next("second".into());
        processor.complete();

        let seen: Vec<String> = (&mut stream).collect().await;
        assert_eq!(seen, vec!["first".to_owned(), "second".to_owned()]);
    }

    #[tokio::test]
    async fn stream_after_complete_replays_and_ends() {
        let processor = DataProcessor::create(7_i64);
        processor.complete();
        processor.on_next(8);

        let seen: Vec<i64> = processor.to_stream().collect().await;
        assert_eq!(seen, vec![7]);
        assert_eq!(processor.subscriber_count(), 0);
    }

    #[test]
    fn dropped_streams_stop_counting() {
        let processor = DataProcessor::create(false);
        let stream = processor.to_stream();
        assert_eq!(processor.subscriber_count(), 1);
        drop(stream);
        assert_eq!(processor.subscriber_count(), 0);
    }
}
