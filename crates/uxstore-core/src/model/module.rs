// ── Model modules ──
//
// Named helper components added to a model at construction. Each one
// declares its own bindings and may re-resolve state on restart.

use super::binder::Binder;
use crate::error::CoreError;

pub trait ModelModule: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Declare bindings. Runs before the model's own `in_setup`.
    fn setup(&self, binder: &mut Binder<'_>) -> Result<(), CoreError>;

    fn cleanup(&self) {}

    /// Runs between cleanup and setup during a restart.
    fn on_restart(&self) {}
}
