// ── Typed keys ──
//
// A key addresses one value slot: namespace + name + ordered index
// parameters, with a declared type and a fixed delivery policy.
// Keys are immutable and deduplicated by the registry.

mod registry;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use strum::{Display, EnumString, IntoStaticStr};

use crate::value::ValueType;

pub use registry::{KeyRegistry, Namespace};

/// When a successful set is broadcast to a key's subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdatePolicy {
    /// Broadcast only when the new value differs from the current one.
    OnChange,
    /// Broadcast every accepted set, equal or not.
    OnEvent,
}

/// Whether a key holds a stored value or maps to a device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum KeyKind {
    Value,
    /// Device reported value that callers may also change. `set_value`
    /// asks the device; the stored value only moves when the device
    /// reports it back.
    Settable,
    /// Setting the key performs an outbound device command; nothing is stored.
    Action,
}

/// Declaration of a key inside a [`Namespace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDef {
    name: String,
    value_type: ValueType,
    policy: UpdatePolicy,
    arity: usize,
    kind: KeyKind,
}

impl KeyDef {
    /// A singleton `ON_CHANGE` value key.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            policy: UpdatePolicy::OnChange,
            arity: 0,
            kind: KeyKind::Value,
        }
    }

    /// Number of index parameters the key is addressed with.
    pub fn indexed(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    pub fn on_event(mut self) -> Self {
        self.policy = UpdatePolicy::OnEvent;
        self
    }

    /// Mark the key as a device action. Actions are always `ON_EVENT`.
    pub fn action(mut self) -> Self {
        self.kind = KeyKind::Action;
        self.policy = UpdatePolicy::OnEvent;
        self
    }

    /// Mark the key as settable through the device.
    pub fn settable(mut self) -> Self {
        self.kind = KeyKind::Settable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }
}

impl fmt::Display for KeyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, {} param(s), {})",
            self.name, self.value_type, self.policy, self.arity, self.kind
        )
    }
}

/// A resolved, canonical key.
///
/// Cheap to clone. Two keys are equal iff their namespace, name,
/// parameters and declared type match.
#[derive(Clone)]
pub struct Key {
    inner: Arc<KeyInner>,
}

struct KeyInner {
    namespace: String,
    name: String,
    params: Vec<u32>,
    value_type: ValueType,
    policy: UpdatePolicy,
    kind: KeyKind,
    path: String,
}

impl Key {
    pub(crate) fn new(namespace: &str, def: &KeyDef, params: &[u32]) -> Self {
        Self {
            inner: Arc::new(KeyInner {
                namespace: namespace.to_owned(),
                name: def.name.clone(),
                params: params.to_vec(),
                value_type: def.value_type.clone(),
                policy: def.policy,
                kind: def.kind,
                path: key_path(namespace, &def.name, params),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn params(&self) -> &[u32] {
        &self.inner.params
    }

    pub fn value_type(&self) -> &ValueType {
        &self.inner.value_type
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.inner.policy
    }

    pub fn kind(&self) -> KeyKind {
        self.inner.kind
    }

    pub fn is_action(&self) -> bool {
        self.inner.kind == KeyKind::Action
    }

    /// Whether `set_value` on this key goes to the device.
    pub fn is_device_routed(&self) -> bool {
        self.inner.kind != KeyKind::Value
    }

    /// Resolved store path, e.g. `camera/display_name/0`.
    pub fn path(&self) -> &str {
        &self.inner.path
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.path == other.inner.path
                && self.inner.value_type == other.inner.value_type)
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.path.hash(state);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("path", &self.inner.path)
            .field("type", &self.inner.value_type)
            .field("policy", &self.inner.policy)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.path)
    }
}

/// Whether `segment` can be used as a namespace or key name: non-empty
/// and free of the `/` path separator.
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/')
}

/// Build the store path for a key: `namespace/name[/p0[/p1...]]`.
pub fn key_path(namespace: &str, name: &str, params: &[u32]) -> String {
    let mut path = format!("{namespace}/{name}");
    for param in params {
        path.push('/');
        path.push_str(&param.to_string());
    }
    path
}
