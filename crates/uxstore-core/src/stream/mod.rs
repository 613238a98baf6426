// ── Per-key event streams ──
//
// Each subscriber owns an unbounded queue fed by the store's put path.
// The queue is the subscription: dropping the observer unsubscribes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::key::Key;
use crate::value::Value;

/// One accepted value change on a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub key: Key,
    /// Value held before this set, `None` on first write.
    pub previous: Option<Value>,
    pub current: Value,
}

/// A live subscription to one key.
///
/// Yields every event broadcast after it was created, in put order,
/// and ends when the store removes its observers.
pub struct KeyObserver {
    key: Key,
    rx: mpsc::UnboundedReceiver<Arc<BroadcastEvent>>,
}

impl KeyObserver {
    pub(crate) fn new(key: Key, rx: mpsc::UnboundedReceiver<Arc<BroadcastEvent>>) -> Self {
        Self { key, rx }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Wait for the next event. `None` once the subscription is completed.
    pub async fn next_event(&mut self) -> Option<Arc<BroadcastEvent>> {
        self.rx.recv().await
    }

    /// Take a queued event without waiting.
    pub fn try_next_event(&mut self) -> Option<Arc<BroadcastEvent>> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving. Events already queued can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for KeyObserver {
    type Item = Arc<BroadcastEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for KeyObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyObserver").field("key", &self.key).finish_non_exhaustive()
    }
}
