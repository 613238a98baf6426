//! Keyed reactive store and model lifecycle for device telemetry UIs.
//!
//! This crate owns the data layer every widget reads from:
//!
//! - **[`KeyedStore`]**: Process-wide value store addressed by typed
//!   [`Key`]s. [`put()`](KeyedStore::put) type-checks, applies the key's
//!   `ON_CHANGE` / `ON_EVENT` policy, and fans each accepted value out to
//!   every [`KeyObserver`] of that key in one per-key critical section.
//!
//! - **[`KeyRegistry`]**: Namespaces of key definitions. Resolves
//!   `(namespace, name, params)` into one canonical key and rejects unknown
//!   names and wrong arity. Built-in families live in [`families`].
//!
//! - **[`DataProcessor<T>`]**: Current-value cell with replay-on-subscribe
//!   streams. Models cache bound key values in processors.
//!
//! - **[`WidgetModel<M>`]**: Lifecycle driver for a [`ModelLogic`]:
//!   `setup` binds keys through a [`Binder`], every applied update runs
//!   `update_states` once, and `cleanup` / `restart` tear bindings down
//!   without letting stale events through. [`ModelModule`]s such as
//!   [`LensModule`] contribute their own bindings.
//!
//! - **Device boundary**: [`DeviceBridge`] turns SDK value callbacks into
//!   puts; [`DeviceLink`] performs outbound commands when an action or
//!   settable key is set through [`set_value()`](KeyedStore::set_value).

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod families;
pub mod key;
pub mod model;
pub mod processor;
pub mod store;
pub mod stream;
mod sync;
pub mod value;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{DeviceBridge, DeviceUpdate, UpdateChannel, update_channel};
pub use command::{CommandKind, DeviceAttachment, DeviceCommand, DeviceLink};
pub use config::StoreConfig;
pub use error::{CoreError, DeviceError};
pub use key::{Key, KeyDef, KeyKind, KeyRegistry, Namespace, UpdatePolicy};
pub use model::{
    Binder, LensModule, ModelLogic, ModelModule, ModelState, Phase, SinkOutcome, WidgetModel,
    WidgetModelBuilder,
};
pub use processor::{DataProcessor, ProcessorStream};
pub use store::{Delivery, KeyedStore, StoredValue};
pub use stream::{BroadcastEvent, KeyObserver};
pub use value::{EnumValue, KeyValue, Value, ValueType};
