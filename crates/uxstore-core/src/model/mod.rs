// ── Model lifecycle ──
//
// A model declares key bindings in `in_setup`, receives one
// `update_states` call per applied update, and tears everything down
// on cleanup. `WidgetModel` drives the lifecycle for any `ModelLogic`.
//
// Lock order: lifecycle, then gate, then phase.

mod binder;
mod lens;
mod module;
mod reentry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::StreamExt;
use futures_util::stream::select_all;
use strum::Display;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub use binder::{Binder, Phase, SinkOutcome};
pub use lens::{LensModule, MAX_COMPONENT_INDEX};
pub use module::ModelModule;

use binder::Sink;
use reentry::HookGuard;
use crate::error::CoreError;
use crate::families::device;
use crate::processor::DataProcessor;
use crate::store::KeyedStore;
use crate::stream::{BroadcastEvent, KeyObserver};
use crate::sync::lock;

/// Behavior of one concrete model.
///
/// Hooks run synchronously while the owning `WidgetModel` holds its
/// lifecycle lock. Calling `setup` or `restart` on that model from a hook
/// fails with `ReentrantLifecycle`; calling `cleanup` is ignored.
pub trait ModelLogic: Send + Sync + 'static {
    /// Declare the model's bindings.
    fn in_setup(&self, binder: &mut Binder<'_>) -> Result<(), CoreError>;

    fn in_cleanup(&self) {}

    /// Recompute derived state from the bound processors.
    fn update_states(&self);

    /// Called with every value of `product/connection`, before the
    /// model's connection processor is updated.
    fn on_product_connection_changed(&self, _connected: bool) {}
}

/// Observable lifecycle state of a [`WidgetModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelState {
    Uninitialized,
    /// `setup` is running.
    Setup,
    Active,
    CleanedUp,
}

/// Lifecycle driver for a [`ModelLogic`].
pub struct WidgetModel<M> {
    inner: Arc<ModelInner<M>>,
}

impl<M> Clone for WidgetModel<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ModelInner<M> {
    store: KeyedStore,
    logic: M,
    modules: Vec<Arc<dyn ModelModule>>,
    product_connection: DataProcessor<bool>,
    lifecycle: Mutex<Lifecycle>,
    /// Generation whose bindings may currently deliver; 0 when none.
    gate: Mutex<u64>,
    phase: Mutex<ModelState>,
    next_generation: AtomicU64,
}

enum Lifecycle {
    Uninitialized,
    Active(ActiveBindings),
    CleanedUp,
}

struct ActiveBindings {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

enum Dispatch {
    Applied,
    Stale,
    Restart,
}

/// Builder for [`WidgetModel`]. Modules can only be added here.
pub struct WidgetModelBuilder<M> {
    store: KeyedStore,
    logic: M,
    modules: Vec<Arc<dyn ModelModule>>,
}

impl<M: ModelLogic> WidgetModelBuilder<M> {
    pub fn with_module(mut self, module: impl ModelModule) -> Self {
        let module: Arc<dyn ModelModule> = Arc::new(module);
        if self.modules.iter().all(|m| m.name() != module.name()) {
            self.modules.push(module);
        }
        self
    }

    pub fn build(self) -> WidgetModel<M> {
        WidgetModel {
            inner: Arc::new(ModelInner {
                store: self.store,
                logic: self.logic,
                modules: self.modules,
                product_connection: DataProcessor::create(false),
                lifecycle: Mutex::new(Lifecycle::Uninitialized),
                gate: Mutex::new(0),
                phase: Mutex::new(ModelState::Uninitialized),
                next_generation: AtomicU64::new(1),
            }),
        }
    }
}

impl<M: ModelLogic> WidgetModel<M> {
    pub fn builder(store: KeyedStore, logic: M) -> WidgetModelBuilder<M> {
        WidgetModelBuilder {
            store,
            logic,
            modules: Vec::new(),
        }
    }

    /// A model without modules.
    pub fn new(store: KeyedStore, logic: M) -> Self {
        Self::builder(store, logic).build()
    }

    /// Bind every declared key and start delivering updates.
    ///
    /// Must be called from within a tokio runtime. On failure no binding
    /// is retained and the model is left `Uninitialized`.
    pub fn setup(&self) -> Result<(), CoreError> {
        let _hooks = self
            .inner
            .enter_hooks()
            .ok_or(CoreError::ReentrantLifecycle)?;
        let mut lifecycle = lock(&self.inner.lifecycle);
        self.inner.setup_locked(&mut lifecycle)
    }

    /// Unbind everything. A no-op unless the model is active.
    pub fn cleanup(&self) {
        let Some(_hooks) = self.inner.enter_hooks() else {
            warn!("cleanup called from one of the model's own hooks, ignoring");
            return;
        };
        let mut lifecycle = lock(&self.inner.lifecycle);
        self.inner.cleanup_locked(&mut lifecycle);
    }

    /// Cleanup then setup, re-resolving every binding. A no-op unless
    /// the model is active.
    pub fn restart(&self) -> Result<(), CoreError> {
        let _hooks = self
            .inner
            .enter_hooks()
            .ok_or(CoreError::ReentrantLifecycle)?;
        let mut lifecycle = lock(&self.inner.lifecycle);
        if !matches!(*lifecycle, Lifecycle::Active(_)) {
            return Ok(());
        }
        self.inner.restart_locked(&mut lifecycle)
    }

    pub fn state(&self) -> ModelState {
        *lock(&self.inner.phase)
    }

    pub fn is_active(&self) -> bool {
        self.state() == ModelState::Active
    }

    pub fn store(&self) -> &KeyedStore {
        &self.inner.store
    }

    pub fn logic(&self) -> &M {
        &self.inner.logic
    }

    /// Whether the product is connected, bound for every model.
    pub fn product_connection(&self) -> &DataProcessor<bool> {
        &self.inner.product_connection
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.inner.modules.iter().map(|m| m.name()).collect()
    }
}

impl<M: ModelLogic> ModelInner<M> {
    fn set_phase(&self, state: ModelState) {
        *lock(&self.phase) = state;
    }

    fn enter_hooks(&self) -> Option<HookGuard> {
        HookGuard::enter(std::ptr::from_ref(self).addr())
    }

    fn setup_locked(self: &Arc<Self>, lifecycle: &mut Lifecycle) -> Result<(), CoreError> {
        if matches!(*lifecycle, Lifecycle::Active(_)) {
            return Err(CoreError::AlreadySetUp);
        }
        self.set_phase(ModelState::Setup);

        let bindings = match self.declare_bindings() {
            Ok(bindings) => bindings,
            Err(e) => return Err(self.roll_back(lifecycle, e)),
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Err(self.roll_back(lifecycle, CoreError::NoRuntime));
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let count = bindings.len();
        let mut sinks: Vec<Sink> = Vec::with_capacity(count);
        let mut observers: Vec<KeyObserver> = Vec::with_capacity(count);
        let cancel = CancellationToken::new();
        let mut restart_pending = false;
        let task = {
            let mut gate = lock(&self.gate);
            *gate = generation;

            let mut seeded = false;
            for binder::Binding { key, mut sink } in bindings {
                let (current, observer) = self.store.snapshot_and_observe(&key);
                // No seed reaches the model once a restart is pending.
                if let Some(value) = current.filter(|_| !restart_pending) {
                    match sink(&value, Phase::Seed) {
                        SinkOutcome::Applied => seeded = true,
                        SinkOutcome::RestartRequested => restart_pending = true,
                        SinkOutcome::Skipped => {}
                    }
                }
                sinks.push(sink);
                observers.push(observer);
            }

            let task = handle.spawn(dispatch_task(
                Arc::downgrade(self),
                generation,
                restart_pending,
                sinks,
                observers,
                cancel.clone(),
            ));
            self.set_phase(ModelState::Active);
            if seeded && !restart_pending {
                self.logic.update_states();
            }
            task
        };

        *lifecycle = Lifecycle::Active(ActiveBindings {
            generation,
            cancel,
            task,
        });
        debug!(generation, bindings = count, restart_pending, "model set up");
        Ok(())
    }

    fn declare_bindings(self: &Arc<Self>) -> Result<Vec<binder::Binding>, CoreError> {
        let mut binder = Binder::new(&self.store);

        let connection = binder.key(device::PRODUCT, device::CONNECTION, &[])?;
        let model = Arc::downgrade(self);
        binder.bind_inspect(&connection, &self.product_connection, move |connected: &bool| {
            if let Some(model) = model.upgrade() {
                model.logic.on_product_connection_changed(*connected);
            }
        })?;

        // Modules first: model bindings may depend on module state.
        for module in &self.modules {
            module.setup(&mut binder)?;
        }
        self.logic.in_setup(&mut binder)?;
        Ok(binder.into_bindings())
    }

    fn roll_back(&self, lifecycle: &mut Lifecycle, error: CoreError) -> CoreError {
        self.logic.in_cleanup();
        for module in &self.modules {
            module.cleanup();
        }
        *lifecycle = Lifecycle::Uninitialized;
        self.set_phase(ModelState::Uninitialized);
        debug!(error = %error, "model setup failed, rolled back");
        error
    }

    fn cleanup_locked(&self, lifecycle: &mut Lifecycle) {
        let active = match std::mem::replace(lifecycle, Lifecycle::CleanedUp) {
            Lifecycle::Active(active) => active,
            other => {
                *lifecycle = other;
                return;
            }
        };

        *lock(&self.gate) = 0;
        self.logic.in_cleanup();
        for module in &self.modules {
            module.cleanup();
        }
        active.cancel.cancel();
        active.task.abort();

        self.set_phase(ModelState::CleanedUp);
        debug!(generation = active.generation, "model cleaned up");
    }

    fn restart_locked(self: &Arc<Self>, lifecycle: &mut Lifecycle) -> Result<(), CoreError> {
        self.cleanup_locked(lifecycle);
        for module in &self.modules {
            module.on_restart();
        }
        self.setup_locked(lifecycle)
    }

    /// Restart requested by a binding of `generation`. Ignored when that
    /// generation is no longer the active one.
    fn restart_from_dispatch(self: &Arc<Self>, generation: u64) {
        let Some(_hooks) = self.enter_hooks() else {
            return;
        };
        let mut lifecycle = lock(&self.lifecycle);
        match &*lifecycle {
            Lifecycle::Active(active) if active.generation == generation => {}
            _ => return,
        }
        debug!(generation, "binding requested restart");
        if let Err(e) = self.restart_locked(&mut lifecycle) {
            warn!(error = %e, "implicit model restart failed");
        }
    }

    fn deliver(&self, generation: u64, sink: &mut Sink, event: &BroadcastEvent) -> Dispatch {
        let _hooks = self.enter_hooks();
        let gate = lock(&self.gate);
        if *gate != generation {
            return Dispatch::Stale;
        }
        if sink(&event.current, Phase::Live) == SinkOutcome::RestartRequested {
            drop(gate);
            return Dispatch::Restart;
        }
        self.logic.update_states();
        Dispatch::Applied
    }
}

impl<M> Drop for ModelInner<M> {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Lifecycle::Active(active) = lifecycle {
            active.cancel.cancel();
        }
    }
}

async fn dispatch_task<M: ModelLogic>(
    model: Weak<ModelInner<M>>,
    generation: u64,
    restart_first: bool,
    mut sinks: Vec<Sink>,
    observers: Vec<KeyObserver>,
    cancel: CancellationToken,
) {
    if restart_first {
        if let Some(model) = model.upgrade() {
            model.restart_from_dispatch(generation);
        }
        trace!(generation, "dispatch task handed over to restart");
        return;
    }

    let mut events = select_all(
        observers
            .into_iter()
            .enumerate()
            .map(|(index, observer)| observer.map(move |event| (index, event))),
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = events.next() => {
                let Some((index, event)) = next else { break };
                let Some(model) = model.upgrade() else { break };
                let Some(sink) = sinks.get_mut(index) else { continue };
                match model.deliver(generation, sink, &event) {
                    Dispatch::Applied => {}
                    Dispatch::Stale => break,
                    Dispatch::Restart => {
                        model.restart_from_dispatch(generation);
                        break;
                    }
                }
            }
        }
    }
    trace!(generation, "dispatch task stopped");
}

impl<M> std::fmt::Debug for WidgetModel<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetModel")
            .field("state", &*lock(&self.inner.phase))
            .field("modules", &self.inner.modules.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::config::StoreConfig;

    struct Counting {
        altitude: DataProcessor<f64>,
        updates: AtomicUsize,
        cleanups: AtomicUsize,
        fail_setup: bool,
    }

    impl Counting {
        fn new(fail_setup: bool) -> Self {
            Self {
                altitude: DataProcessor::create(0.0),
                updates: AtomicUsize::new(0),
                cleanups: AtomicUsize::new(0),
                fail_setup,
            }
        }
    }

    impl ModelLogic for Counting {
        fn in_setup(&self, binder: &mut Binder<'_>) -> Result<(), CoreError> {
            let altitude = binder.key(device::FLIGHT_CONTROLLER, device::ALTITUDE, &[])?;
            binder.bind(&altitude, &self.altitude)?;
            if self.fail_setup {
                binder.key("gimbal", "yaw", &[])?;
            }
            Ok(())
        }

        fn in_cleanup(&self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }

        fn update_states(&self) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn store() -> KeyedStore {
        let store = KeyedStore::new(StoreConfig::default()).unwrap();
        device::register_all(store.registry()).unwrap();
        store
    }

    #[tokio::test]
    async fn setup_twice_is_rejected() {
        let model = WidgetModel::new(store(), Counting::new(false));
        model.setup().unwrap();
        assert!(matches!(model.setup(), Err(CoreError::AlreadySetUp)));
        model.cleanup();
    }

    #[tokio::test]
    async fn seeding_runs_update_states_once() {
        let store = store();
        let altitude = store.key(device::FLIGHT_CONTROLLER, device::ALTITUDE, &[]).unwrap();
        store.put(&altitude, 30.0).unwrap();

        let model = WidgetModel::new(store, Counting::new(false));
        model.setup().unwrap();
        assert!((model.logic().altitude.value() - 30.0).abs() < f64::EPSILON);
        assert_eq!(model.logic().updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_setup_rolls_back() {
        let store = store();
        let altitude = store.key(device::FLIGHT_CONTROLLER, device::ALTITUDE, &[]).unwrap();
        let model = WidgetModel::new(store.clone(), Counting::new(true));

        assert!(matches!(model.setup(), Err(CoreError::UnknownNamespace { .. })));
        assert_eq!(model.state(), ModelState::Uninitialized);
        assert_eq!(model.logic().cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(store.observer_count(&altitude), 0);
    }

    #[test]
    fn setup_outside_runtime_fails() {
        let store = store();
        let altitude = store.key(device::FLIGHT_CONTROLLER, device::ALTITUDE, &[]).unwrap();
        let model = WidgetModel::new(store.clone(), Counting::new(false));

        assert!(matches!(model.setup(), Err(CoreError::NoRuntime)));
        assert_eq!(model.state(), ModelState::Uninitialized);
        assert_eq!(store.observer_count(&altitude), 0);
    }

    #[tokio::test]
    async fn restart_on_inactive_model_is_noop() {
        let model = WidgetModel::new(store(), Counting::new(false));
        model.restart().unwrap();
        assert_eq!(model.state(), ModelState::Uninitialized);
    }
}
