// ── Key bindings ──
//
// A binding pairs a key with a sink. The sink receives the store value
// once at seed time and then every live event until cleanup.

use tracing::warn;

use crate::error::CoreError;
use crate::key::Key;
use crate::processor::DataProcessor;
use crate::store::KeyedStore;
use crate::value::{KeyValue, Value};

/// Where a value handed to a sink came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Current store value read when the binding was created.
    Seed,
    /// An event broadcast after the binding was created.
    Live,
}

/// What a sink did with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    Applied,
    Skipped,
    /// The owning model must be restarted before any further delivery.
    RestartRequested,
}

pub(crate) type Sink = Box<dyn FnMut(&Value, Phase) -> SinkOutcome + Send>;

pub(crate) struct Binding {
    pub key: Key,
    pub sink: Sink,
}

/// Collects the bindings a model declares during setup.
///
/// Nothing is subscribed until setup as a whole succeeds.
pub struct Binder<'a> {
    store: &'a KeyedStore,
    bindings: Vec<Binding>,
}

impl<'a> Binder<'a> {
    pub(crate) fn new(store: &'a KeyedStore) -> Self {
        Self {
            store,
            bindings: Vec::new(),
        }
    }

    pub fn store(&self) -> &KeyedStore {
        self.store
    }

    /// Resolve a key through the store's registry.
    pub fn key(&self, namespace: &str, name: &str, params: &[u32]) -> Result<Key, CoreError> {
        self.store.key(namespace, name, params)
    }

    /// Cache every value of `key` in `processor`.
    pub fn bind<T: KeyValue>(
        &mut self,
        key: &Key,
        processor: &DataProcessor<T>,
    ) -> Result<(), CoreError> {
        self.bind_map(key, processor, |v: T| v)
    }

    /// Cache `transform(value)` in `processor` for every value of `key`.
    pub fn bind_map<T, U, F>(
        &mut self,
        key: &Key,
        processor: &DataProcessor<U>,
        transform: F,
    ) -> Result<(), CoreError>
    where
        T: KeyValue,
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + 'static,
    {
        check_binding_type::<T>(key)?;
        let processor = processor.clone();
        let path = key.path().to_owned();
        self.push(
            key,
            Box::new(move |value: &Value, _phase: Phase| match T::from_value(value) {
                Some(decoded) => {
                    processor.on_next(transform(decoded));
                    SinkOutcome::Applied
                }
                None => undecodable(&path, value),
            }),
        );
        Ok(())
    }

    /// Like [`bind`](Self::bind), running `side_effect` on each value
    /// before the processor is updated.
    pub fn bind_inspect<T, F>(
        &mut self,
        key: &Key,
        processor: &DataProcessor<T>,
        mut side_effect: F,
    ) -> Result<(), CoreError>
    where
        T: KeyValue,
        F: FnMut(&T) + Send + 'static,
    {
        check_binding_type::<T>(key)?;
        let processor = processor.clone();
        let path = key.path().to_owned();
        self.push(
            key,
            Box::new(move |value: &Value, _phase: Phase| match T::from_value(value) {
                Some(decoded) => {
                    side_effect(&decoded);
                    processor.on_next(decoded);
                    SinkOutcome::Applied
                }
                None => undecodable(&path, value),
            }),
        );
        Ok(())
    }

    /// Restart the owning model when `key` moves away from the value it
    /// held at setup. Used for keys that change how other keys resolve.
    pub fn restart_on_change(&mut self, key: &Key) {
        let mut baseline: Option<Value> = None;
        self.push(
            key,
            Box::new(move |value: &Value, phase: Phase| match phase {
                Phase::Seed => {
                    baseline = Some(value.clone());
                    SinkOutcome::Skipped
                }
                Phase::Live if baseline.as_ref() == Some(value) => SinkOutcome::Skipped,
                Phase::Live => {
                    baseline = Some(value.clone());
                    SinkOutcome::RestartRequested
                }
            }),
        );
    }

    /// Restart the owning model when `key` differs from `resolved`, the
    /// value the model read while resolving its other keys. Unlike
    /// [`restart_on_change`](Self::restart_on_change) this also fires at
    /// seed time, catching a change that landed between that read and
    /// the subscription.
    pub fn restart_on_change_from(&mut self, key: &Key, resolved: Option<Value>) {
        let mut baseline = resolved;
        self.push(
            key,
            Box::new(move |value: &Value, _phase: Phase| {
                if baseline.as_ref() == Some(value) {
                    SinkOutcome::Skipped
                } else {
                    baseline = Some(value.clone());
                    SinkOutcome::RestartRequested
                }
            }),
        );
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn into_bindings(self) -> Vec<Binding> {
        self.bindings
    }

    fn push(&mut self, key: &Key, sink: Sink) {
        self.bindings.push(Binding {
            key: key.clone(),
            sink,
        });
    }
}

fn check_binding_type<T: KeyValue>(key: &Key) -> Result<(), CoreError> {
    let wanted = T::value_type();
    if *key.value_type() == wanted {
        Ok(())
    } else {
        Err(CoreError::ValueTypeMismatch {
            key: key.path().to_owned(),
            expected: key.value_type().clone(),
            actual: wanted,
        })
    }
}

fn undecodable(path: &str, value: &Value) -> SinkOutcome {
    warn!(key = %path, value = %value, "bound value does not decode, skipping");
    SinkOutcome::Skipped
}
