// ── Store layer ──

pub(crate) mod flat_store;
mod keyed_store;

pub use flat_store::StoredValue;
pub use keyed_store::{Delivery, KeyedStore};
