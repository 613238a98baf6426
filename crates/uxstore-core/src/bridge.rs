// ── Inbound SDK bridge ──
//
// The device SDK reports value changes as (namespace, name, params,
// value) callbacks. Each callback becomes exactly one `put`.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::CoreError;
use crate::store::{Delivery, KeyedStore};
use crate::value::Value;

/// One value-changed callback from the SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUpdate {
    pub namespace: String,
    pub name: String,
    pub params: Vec<u32>,
    pub value: Value,
}

impl DeviceUpdate {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        params: &[u32],
        value: impl Into<Value>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            params: params.to_vec(),
            value: value.into(),
        }
    }
}

/// Sender and receiver halves returned by [`update_channel`].
pub type UpdateChannel = (mpsc::Sender<DeviceUpdate>, mpsc::Receiver<DeviceUpdate>);

/// Bounded channel feeding [`DeviceBridge::spawn`].
pub fn update_channel(config: &StoreConfig) -> Result<UpdateChannel, CoreError> {
    config.validate()?;
    Ok(mpsc::channel(config.update_channel_size))
}

#[derive(Clone)]
pub struct DeviceBridge {
    store: KeyedStore,
}

impl DeviceBridge {
    pub fn new(store: KeyedStore) -> Self {
        Self { store }
    }

    /// Apply one SDK callback to the store.
    pub fn on_value_changed(&self, update: DeviceUpdate) -> Result<Delivery, CoreError> {
        let key = self.store.key(&update.namespace, &update.name, &update.params)?;
        self.store.put(&key, update.value)
    }

    /// Drain `rx` into the store until it closes or `cancel` fires.
    /// Rejected updates are logged and dropped.
    pub fn spawn(
        &self,
        rx: mpsc::Receiver<DeviceUpdate>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, CoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| CoreError::NoRuntime)?;
        Ok(handle.spawn(ingest_task(self.clone(), rx, cancel)))
    }
}

async fn ingest_task(
    bridge: DeviceBridge,
    mut rx: mpsc::Receiver<DeviceUpdate>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            update = rx.recv() => {
                let Some(update) = update else { break };
                let namespace = update.namespace.clone();
                let name = update.name.clone();
                if let Err(e) = bridge.on_value_changed(update) {
                    warn!(namespace = %namespace, name = %name, error = %e, "rejected device update");
                }
            }
        }
    }
    debug!("device update ingest stopped");
}
