// ── Outbound device commands ──
//
// Setting an action or settable key never touches the store: the value
// becomes the argument of a device command, performed by the attached
// `DeviceLink` on a dedicated processor task. Callers await the
// device's verdict. A settable key's stored value changes only when the
// device reports it back through the bridge.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use strum::Display;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CoreError, DeviceError};
use crate::key::Key;
use crate::store::KeyedStore;
use crate::value::Value;

/// What the device is asked to do with a command's argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CommandKind {
    /// Run an action key.
    Perform,
    /// Write a settable key.
    Set,
}

/// A command issued by setting an action or settable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    pub kind: CommandKind,
    pub key: Key,
    pub argument: Value,
}

/// The SDK side of outbound commands.
pub trait DeviceLink: Send + Sync + 'static {
    fn perform(&self, command: DeviceCommand) -> BoxFuture<'static, Result<(), DeviceError>>;

    /// Whether the connected product exposes `key`. Commands on
    /// unsupported keys are refused before they reach [`perform`](Self::perform).
    fn is_key_supported(&self, _key: &Key) -> bool {
        true
    }
}

/// The attached link and the sender feeding its processor task.
pub(crate) struct DeviceHandle {
    pub link: Arc<dyn DeviceLink>,
    pub sender: mpsc::Sender<CommandEnvelope>,
}

/// A command paired with its response channel.
pub(crate) struct CommandEnvelope {
    pub command: DeviceCommand,
    pub response_tx: oneshot::Sender<Result<(), CoreError>>,
}

/// Handle to an attached device link.
///
/// The link stays attached until [`detach`](Self::detach) is called or
/// another link is attached to the same store.
pub struct DeviceAttachment {
    store: KeyedStore,
    device: Arc<DeviceHandle>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DeviceAttachment {
    pub(crate) fn new(
        store: KeyedStore,
        device: Arc<DeviceHandle>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            store,
            device,
            cancel,
            task,
        }
    }

    /// Stop the command processor. Later action sets fail with
    /// `DeviceUnavailable`; a command already in flight is abandoned.
    pub async fn detach(self) {
        self.store.clear_device(&self.device);
        self.cancel.cancel();
        let _ = self.task.await;
        debug!("device link detached");
    }

    pub fn is_attached(&self) -> bool {
        !self.task.is_finished()
    }
}

pub(crate) async fn command_processor_task(
    link: Arc<dyn DeviceLink>,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(link.as_ref(), envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

async fn route_command(link: &dyn DeviceLink, command: DeviceCommand) -> Result<(), CoreError> {
    let key = command.key.path().to_owned();
    debug!(key = %key, kind = %command.kind, argument = %command.argument, "sending device command");
    link.perform(command).await.map_err(|e| {
        warn!(key = %key, code = ?e.code, error = %e, "device rejected command");
        CoreError::UpstreamCommandFailure {
            key,
            detail: e.detail,
        }
    })
}
