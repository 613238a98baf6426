// ── Keyed reactive store ──
//
// Process-wide value store with per-key fan-out. Each key has its own
// critical section covering compare, write and enqueue, so every
// subscriber of a key sees the same event order.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::flat_store::{FlatStore, StoredValue};
use crate::command::{
    CommandEnvelope, CommandKind, DeviceAttachment, DeviceCommand, DeviceHandle, DeviceLink,
    command_processor_task,
};
use crate::config::StoreConfig;
use crate::error::CoreError;
use crate::families;
use crate::key::{Key, KeyKind, KeyRegistry, UpdatePolicy};
use crate::stream::{BroadcastEvent, KeyObserver};
use crate::sync::lock;
use crate::value::{KeyValue, Value};

/// Outcome of an accepted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The value was stored and enqueued for this many live subscribers.
    Broadcast { subscribers: usize },
    /// `ON_CHANGE` key set to its current value: nothing stored or sent.
    Unchanged,
    /// Action or settable key: the device accepted the command.
    Performed,
}

/// Cheaply clonable handle to a keyed store.
///
/// Clones share state. Independent stores (one per test, say) share
/// nothing.
#[derive(Clone)]
pub struct KeyedStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: StoreConfig,
    registry: KeyRegistry,
    values: FlatStore,
    channels: DashMap<String, Arc<KeyChannel>>,
    device: ArcSwapOption<DeviceHandle>,
}

/// Subscriber list of one key. Its mutex is the key's critical section.
#[derive(Default)]
struct KeyChannel {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Arc<BroadcastEvent>>>>,
}

impl KeyedStore {
    /// Create a store with the `preferences`, `messaging` and `product`
    /// families registered. Fails with `InvalidConfig` on zero-sized
    /// channel bounds.
    pub fn new(config: StoreConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let registry = KeyRegistry::new();
        registry.register_namespace(families::preferences::namespace())?;
        registry.register_namespace(families::messaging::namespace())?;
        registry.register_namespace(families::device::product())?;

        let values = FlatStore::with_capacity(config.initial_capacity);
        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                registry,
                values,
                channels: DashMap::new(),
                device: ArcSwapOption::empty(),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.inner.registry
    }

    /// Shorthand for [`KeyRegistry::create_key`].
    pub fn key(&self, namespace: &str, name: &str, params: &[u32]) -> Result<Key, CoreError> {
        self.inner.registry.create_key(namespace, name, params)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Store a value and fan it out to the key's subscribers.
    ///
    /// This is the synchronous write path used by SDK callbacks. A value
    /// that does not conform to the key's declared type is rejected with
    /// no mutation and no delivery.
    pub fn put(&self, key: &Key, value: impl Into<Value>) -> Result<Delivery, CoreError> {
        let value = value.into();
        if key.is_action() {
            return Err(CoreError::ActionKeyNotStorable {
                key: key.path().to_owned(),
            });
        }
        check_type(key, &value)?;

        let channel = self.channel(key);
        let mut subscribers = lock(&channel.subscribers);

        let previous = self.inner.values.get_current(key.path());
        if key.policy() == UpdatePolicy::OnChange && previous.as_ref() == Some(&value) {
            trace!(key = %key, "value unchanged, skipping");
            return Ok(Delivery::Unchanged);
        }

        self.inner.values.set(key.path(), value.clone());

        let event = Arc::new(BroadcastEvent {
            key: key.clone(),
            previous,
            current: value,
        });
        subscribers.retain(|tx| tx.send(Arc::clone(&event)).is_ok());

        debug!(key = %key, value = %event.current, subscribers = subscribers.len(), "key updated");
        Ok(Delivery::Broadcast {
            subscribers: subscribers.len(),
        })
    }

    /// Set a key and await the outcome.
    ///
    /// Value keys behave like [`put`](Self::put). Action and settable
    /// keys are sent to the attached device link and resolve with the
    /// device's verdict.
    pub async fn set_value(
        &self,
        key: &Key,
        value: impl Into<Value> + Send,
    ) -> Result<Delivery, CoreError> {
        let value = value.into();
        let kind = match key.kind() {
            KeyKind::Value => return self.put(key, value),
            KeyKind::Settable => CommandKind::Set,
            KeyKind::Action => CommandKind::Perform,
        };
        check_type(key, &value)?;

        let device = self
            .inner
            .device
            .load_full()
            .ok_or(CoreError::DeviceUnavailable)?;
        if !device.link.is_key_supported(key) {
            return Err(CoreError::UnsupportedKey {
                key: key.path().to_owned(),
            });
        }
        let (tx, rx) = oneshot::channel();
        device
            .sender
            .send(CommandEnvelope {
                command: DeviceCommand {
                    kind,
                    key: key.clone(),
                    argument: value,
                },
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::DeviceUnavailable)?;

        rx.await.map_err(|_| CoreError::DeviceUnavailable)??;
        Ok(Delivery::Performed)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get_value(&self, key: &Key) -> Option<Value> {
        self.inner.values.get_current(key.path())
    }

    /// Typed read. `None` when unset or when the payload does not decode
    /// as `T`.
    pub fn get<T: KeyValue>(&self, key: &Key) -> Option<T> {
        self.get_value(key).as_ref().and_then(T::from_value)
    }

    pub fn stored(&self, key: &Key) -> Option<StoredValue> {
        self.inner.values.get(key.path())
    }

    /// Number of keys that have ever been written.
    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to future events on `key`. Nothing is replayed.
    pub fn add_observer(&self, key: &Key) -> KeyObserver {
        let channel = self.channel(key);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&channel.subscribers).push(tx);
        KeyObserver::new(key.clone(), rx)
    }

    /// Read the current value and subscribe in one critical section, so
    /// no event falls between the snapshot and the first delivery.
    pub fn snapshot_and_observe(&self, key: &Key) -> (Option<Value>, KeyObserver) {
        let channel = self.channel(key);
        let (tx, rx) = mpsc::unbounded_channel();
        let current = {
            let mut subscribers = lock(&channel.subscribers);
            subscribers.push(tx);
            self.inner.values.get_current(key.path())
        };
        (current, KeyObserver::new(key.clone(), rx))
    }

    /// Complete every subscription on `key`. Queued events still drain.
    pub fn remove_all_observers_for_key(&self, key: &Key) {
        let channel = self.inner.channels.get(key.path()).map(|r| Arc::clone(r.value()));
        if let Some(channel) = channel {
            let removed = std::mem::take(&mut *lock(&channel.subscribers)).len();
            debug!(key = %key, removed, "observers removed");
        }
    }

    /// Complete every subscription on every key.
    pub fn remove_all_observers(&self) {
        let channels: Vec<Arc<KeyChannel>> = self
            .inner
            .channels
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        for channel in channels {
            lock(&channel.subscribers).clear();
        }
        debug!("all observers removed");
    }

    /// Live subscribers of `key`.
    pub fn observer_count(&self, key: &Key) -> usize {
        let channel = self.inner.channels.get(key.path()).map(|r| Arc::clone(r.value()));
        channel.map_or(0, |channel| {
            lock(&channel.subscribers)
                .iter()
                .filter(|tx| !tx.is_closed())
                .count()
        })
    }

    // ── Device link ──────────────────────────────────────────────────

    /// Attach the SDK command side. Replaces any previously attached link.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach_device(&self, link: Arc<dyn DeviceLink>) -> Result<DeviceAttachment, CoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| CoreError::NoRuntime)?;
        let (tx, rx) = mpsc::channel(self.inner.config.command_channel_size);
        let cancel = CancellationToken::new();
        let task = handle.spawn(command_processor_task(Arc::clone(&link), rx, cancel.clone()));

        let device = Arc::new(DeviceHandle { link, sender: tx });
        self.inner.device.store(Some(Arc::clone(&device)));
        debug!("device link attached");
        Ok(DeviceAttachment::new(self.clone(), device, cancel, task))
    }

    pub fn has_device(&self) -> bool {
        self.inner.device.load().is_some()
    }

    /// Whether the attached device exposes `key`. `false` with no device
    /// attached.
    pub fn is_key_supported(&self, key: &Key) -> bool {
        self.inner
            .device
            .load()
            .as_ref()
            .is_some_and(|device| device.link.is_key_supported(key))
    }

    pub(crate) fn clear_device(&self, device: &Arc<DeviceHandle>) {
        self.inner.device.rcu(|current| match current {
            Some(active) if Arc::ptr_eq(active, device) => None,
            other => other.clone(),
        });
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn channel(&self, key: &Key) -> Arc<KeyChannel> {
        if let Some(channel) = self.inner.channels.get(key.path()) {
            return Arc::clone(channel.value());
        }
        Arc::clone(
            self.inner
                .channels
                .entry(key.path().to_owned())
                .or_default()
                .value(),
        )
    }
}

fn check_type(key: &Key, value: &Value) -> Result<(), CoreError> {
    if value.conforms_to(key.value_type()) {
        Ok(())
    } else {
        Err(CoreError::ValueTypeMismatch {
            key: key.path().to_owned(),
            expected: key.value_type().clone(),
            actual: value.value_type(),
        })
    }
}

impl std::fmt::Debug for KeyedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedStore")
            .field("keys", &self.inner.values.len())
            .field("channels", &self.inner.channels.len())
            .finish_non_exhaustive()
    }
}
