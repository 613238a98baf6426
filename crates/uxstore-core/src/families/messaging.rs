// ── Messaging keys ──
//
// Event-style keys used by widgets to post and retract warnings.
// Every set is delivered, even when the text repeats.

use crate::key::{KeyDef, Namespace};
use crate::value::ValueType;

pub const NAMESPACE: &str = "messaging";

pub const WARNING_MESSAGE: &str = "warning_message";
pub const REMOVE_WARNING_MESSAGE: &str = "remove_warning_message";

pub fn namespace() -> Namespace {
    Namespace::new(NAMESPACE)
        .with_key(KeyDef::new(WARNING_MESSAGE, ValueType::Text).on_event())
        .with_key(KeyDef::new(REMOVE_WARNING_MESSAGE, ValueType::Text).on_event())
}
