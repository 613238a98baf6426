// ── Core error types ──
//
// Every fallible operation in uxstore-core returns `CoreError`.
// Device-side failures arrive as `DeviceError` and are translated
// into `UpstreamCommandFailure` at the command boundary.

use thiserror::Error;

use crate::value::ValueType;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Key resolution errors ────────────────────────────────────────
    #[error("Unknown key namespace: {namespace}")]
    UnknownNamespace { namespace: String },

    #[error("Unknown key {name} in namespace {namespace}")]
    UnknownKey { namespace: String, name: String },

    #[error("Key {key} takes {expected} parameter(s), got {actual}")]
    ParamArity {
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("Conflicting definition for key {key}: already declared as {existing}")]
    ConflictingDefinition { key: String, existing: String },

    #[error("Invalid key or namespace name {name:?}: must be non-empty and contain no '/'")]
    InvalidKeyName { name: String },

    // ── Value errors ─────────────────────────────────────────────────
    #[error("Value type mismatch for {key}: expected {expected}, got {actual}")]
    ValueTypeMismatch {
        key: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("Action key {key} carries no stored value")]
    ActionKeyNotStorable { key: String },

    // ── Device errors ────────────────────────────────────────────────
    #[error("Device rejected command on {key}: {detail}")]
    UpstreamCommandFailure { key: String, detail: String },

    #[error("No device link attached")]
    DeviceUnavailable,

    #[error("Attached device does not support {key}")]
    UnsupportedKey { key: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Model is already set up -- call cleanup first")]
    AlreadySetUp,

    #[error("No tokio runtime available to drive model bindings")]
    NoRuntime,

    #[error("Model lifecycle called from one of its own hooks")]
    ReentrantLifecycle,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Invalid store config {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

/// Failure reported by the device SDK for an outbound command.
#[derive(Debug, Clone, Error)]
#[error("{detail}")]
pub struct DeviceError {
    /// SDK-specific error code, when the SDK provides one.
    pub code: Option<i32>,
    pub detail: String,
}

impl DeviceError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            code: None,
            detail: detail.into(),
        }
    }

    pub fn with_code(code: i32, detail: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            detail: detail.into(),
        }
    }
}
