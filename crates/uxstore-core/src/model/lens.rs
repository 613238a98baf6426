// ── Lens addressing module ──
//
// Multi-lens cameras expose per-lens settings under `camera_lens`;
// single-lens cameras expose them under `camera`. The module tracks
// which arrangement the current camera uses, resolves lens keys
// accordingly, and restarts its model when the arrangement changes.
//
// The arrangement is read once per setup. Its keys are then bound
// against that read, so a change landing before the subscription still
// restarts the model.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::binder::Binder;
use super::module::ModelModule;
use super::{ModelLogic, WidgetModel};
use crate::error::CoreError;
use crate::families::device;
use crate::key::{Key, KeyRegistry};
use crate::processor::{DataProcessor, ProcessorStream};
use crate::sync::lock;
use crate::value::Value;

/// Highest component index a camera or lens key may address.
pub const MAX_COMPONENT_INDEX: u32 = 10;

/// Dual-sensor cameras that report their IR sensor as a separate camera.
const SPLIT_SENSOR_CAMERAS: [&str; 2] = ["Zenmuse XT2 Visual", "Mavic 2 Enterprise Dual-Visual"];
const IR_SENSOR_INDEX: u32 = 1;

#[derive(Clone)]
pub struct LensModule {
    inner: Arc<LensInner>,
}

struct LensInner {
    camera_index: AtomicU32,
    /// Index applied at the next setup or restart.
    pending_index: Mutex<Option<u32>>,
    multi_lens_supported: DataProcessor<bool>,
    display_name: DataProcessor<String>,
    /// Whether the latest setup found a different arrangement than the
    /// one before it.
    arrangement_updated: DataProcessor<bool>,
}

impl LensModule {
    pub fn new(camera_index: u32) -> Self {
        Self {
            inner: Arc::new(LensInner {
                camera_index: AtomicU32::new(camera_index.min(MAX_COMPONENT_INDEX)),
                pending_index: Mutex::new(None),
                multi_lens_supported: DataProcessor::create(false),
                display_name: DataProcessor::create(String::new()),
                arrangement_updated: DataProcessor::create(false),
            }),
        }
    }

    /// Camera index the module currently tracks.
    pub fn camera_index(&self) -> u32 {
        self.inner.camera_index.load(Ordering::Acquire)
    }

    pub fn is_multi_lens_supported(&self) -> bool {
        self.inner.multi_lens_supported.value()
    }

    pub fn display_name(&self) -> String {
        self.inner.display_name.value()
    }

    /// Whether the last arrangement update changed the arrangement.
    pub fn is_arrangement_updated(&self) -> bool {
        self.inner.arrangement_updated.value()
    }

    pub fn arrangement_updated(&self) -> ProcessorStream<bool> {
        self.inner.arrangement_updated.to_stream()
    }

    /// Resolve a lens setting key for the current arrangement.
    ///
    /// `component` is the camera index, `lens` the lens index within it.
    pub fn create_lens_key(
        &self,
        registry: &KeyRegistry,
        name: &str,
        component: u32,
        lens: u32,
    ) -> Result<Key, CoreError> {
        let component = component.min(MAX_COMPONENT_INDEX);
        let lens = lens.min(MAX_COMPONENT_INDEX);

        if self.is_multi_lens_supported() {
            return registry.create_key(device::CAMERA_LENS, name, &[component, lens]);
        }
        let display_name = self.display_name();
        if SPLIT_SENSOR_CAMERAS.contains(&display_name.as_str()) && lens == IR_SENSOR_INDEX {
            registry.create_key(device::CAMERA, name, &[lens])
        } else {
            registry.create_key(device::CAMERA, name, &[component])
        }
    }

    /// Track another camera. Restarts `model` when it is active.
    ///
    /// Fails with `ReentrantLifecycle`, leaving the index unchanged, when
    /// called from one of `model`'s hooks.
    pub fn set_camera_index<M: ModelLogic>(
        &self,
        model: &WidgetModel<M>,
        camera_index: u32,
    ) -> Result<(), CoreError> {
        let camera_index = camera_index.min(MAX_COMPONENT_INDEX);
        if model.is_active() {
            *lock(&self.inner.pending_index) = Some(camera_index);
            let result = model.restart();
            if matches!(result, Err(CoreError::ReentrantLifecycle)) {
                lock(&self.inner.pending_index).take();
            }
            result
        } else {
            self.inner.camera_index.store(camera_index, Ordering::Release);
            Ok(())
        }
    }

    fn apply_pending_index(&self) {
        if let Some(index) = lock(&self.inner.pending_index).take() {
            self.inner.camera_index.store(index, Ordering::Release);
            debug!(camera_index = index, "lens module switched camera");
        }
    }
}

impl ModelModule for LensModule {
    fn name(&self) -> &'static str {
        "lens"
    }

    fn setup(&self, binder: &mut Binder<'_>) -> Result<(), CoreError> {
        self.apply_pending_index();
        let index = self.camera_index();
        let supported = binder.key(device::CAMERA, device::IS_MULTI_LENS_CAMERA_SUPPORTED, &[index])?;
        let display_name = binder.key(device::CAMERA, device::DISPLAY_NAME, &[index])?;

        // Refresh before the model resolves its lens keys.
        let supported_now = binder.store().get::<bool>(&supported);
        let name_now = binder.store().get::<String>(&display_name);
        let mut changed = false;
        if let Some(value) = supported_now {
            changed |= value != self.inner.multi_lens_supported.value();
            self.inner.multi_lens_supported.on_next(value);
        }
        if let Some(value) = name_now.clone() {
            changed |= *self.inner.display_name.load() != value;
            self.inner.display_name.on_next(value);
        }
        self.inner.arrangement_updated.on_next(changed);
        if changed {
            debug!(camera_index = index, "lens arrangement changed");
        }

        binder.restart_on_change_from(&supported, supported_now.map(Value::from));
        binder.restart_on_change_from(&display_name, name_now.map(Value::from));
        Ok(())
    }

    fn on_restart(&self) {
        self.apply_pending_index();
    }
}

impl std::fmt::Debug for LensModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LensModule")
            .field("camera_index", &self.camera_index())
            .field("multi_lens_supported", &self.is_multi_lens_supported())
            .finish_non_exhaustive()
    }
}
