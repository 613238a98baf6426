// ── Store configuration ──
//
// Built by the embedding application. This crate never reads config
// from disk; see `uxstore-config` for file and env loading.

use crate::error::CoreError;

/// Sizing knobs for a [`KeyedStore`](crate::KeyedStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Initial slot capacity of the flat store.
    pub initial_capacity: usize,
    /// Bound of the outbound device command queue.
    pub command_channel_size: usize,
    /// Bound of the inbound SDK update queue created by `update_channel`.
    pub update_channel_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 100,
            command_channel_size: 64,
            update_channel_size: 256,
        }
    }
}

impl StoreConfig {
    /// Reject sizes the store cannot run with. Both channel bounds must
    /// be non-zero.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("command_channel_size", self.command_channel_size),
            ("update_channel_size", self.update_channel_size),
        ] {
            if value == 0 {
                return Err(CoreError::InvalidConfig {
                    field: field.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }
}
