// ── Device key families ──
//
// Key declarations mirroring the device SDK's components. Index
// parameters are component indices: `camera[index]` and
// `camera_lens[index, lens]`.

use crate::error::CoreError;
use crate::key::{KeyDef, KeyRegistry, Namespace};
use crate::value::ValueType;

pub const PRODUCT: &str = "product";
pub const FLIGHT_CONTROLLER: &str = "flight_controller";
pub const CAMERA: &str = "camera";
pub const CAMERA_LENS: &str = "camera_lens";

// product
pub const CONNECTION: &str = "connection";

// flight_controller
pub const ALTITUDE: &str = "altitude";
pub const TAKEOFF_LOCATION_ALTITUDE: &str = "takeoff_location_altitude";
pub const START_TAKEOFF: &str = "start_takeoff";
pub const START_GO_HOME: &str = "start_go_home";

// camera
pub const DISPLAY_NAME: &str = "display_name";
pub const IS_MULTI_LENS_CAMERA_SUPPORTED: &str = "is_multi_lens_camera_supported";
pub const START_RECORD_VIDEO: &str = "start_record_video";
pub const STOP_RECORD_VIDEO: &str = "stop_record_video";

// lens settings, declared on both `camera` and `camera_lens`
pub const ISO: &str = "iso";
pub const ZOOM_RATIO: &str = "zoom_ratio";

fn lens_settings(ns: Namespace, arity: usize) -> Namespace {
    ns.with_key(KeyDef::new(ISO, ValueType::Int).indexed(arity).settable())
        .with_key(
            KeyDef::new(ZOOM_RATIO, ValueType::Float)
                .indexed(arity)
                .settable(),
        )
}

pub fn product() -> Namespace {
    Namespace::new(PRODUCT).with_key(KeyDef::new(CONNECTION, ValueType::Bool))
}

pub fn flight_controller() -> Namespace {
    Namespace::new(FLIGHT_CONTROLLER)
        .with_key(KeyDef::new(ALTITUDE, ValueType::Float))
        .with_key(KeyDef::new(TAKEOFF_LOCATION_ALTITUDE, ValueType::Float))
        .with_key(KeyDef::new(START_TAKEOFF, ValueType::Bool).action())
        .with_key(KeyDef::new(START_GO_HOME, ValueType::Bool).action())
}

pub fn camera() -> Namespace {
    let ns = Namespace::new(CAMERA)
        .with_key(KeyDef::new(DISPLAY_NAME, ValueType::Text).indexed(1))
        .with_key(KeyDef::new(IS_MULTI_LENS_CAMERA_SUPPORTED, ValueType::Bool).indexed(1))
        .with_key(KeyDef::new(START_RECORD_VIDEO, ValueType::Bool).indexed(1).action())
        .with_key(KeyDef::new(STOP_RECORD_VIDEO, ValueType::Bool).indexed(1).action());
    lens_settings(ns, 1)
}

pub fn camera_lens() -> Namespace {
    lens_settings(Namespace::new(CAMERA_LENS), 2)
}

/// Register every device family on `registry`.
pub fn register_all(registry: &KeyRegistry) -> Result<(), CoreError> {
    registry.register_namespace(product())?;
    registry.register_namespace(flight_controller())?;
    registry.register_namespace(camera())?;
    registry.register_namespace(camera_lens())?;
    Ok(())
}
