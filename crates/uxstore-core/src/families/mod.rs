// ── Built-in key families ──
//
// `preferences` and `messaging` are registered by every store.
// Device families are opt-in through `device::register_all`.

pub mod device;
pub mod messaging;
pub mod preferences;
