// ── Hook re-entry tracking ──
//
// Lifecycle methods hold the model's lifecycle lock while its hooks
// run. Each thread records which models it is currently running hooks
// for, so a hook calling back into its own model fails fast instead of
// blocking on that lock.

use std::cell::RefCell;

thread_local! {
    static ACTIVE_HOOKS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as running hooks for one model until dropped.
pub(crate) struct HookGuard {
    model: usize,
}

impl HookGuard {
    /// `None` when this thread is already inside a hook of `model`.
    pub(crate) fn enter(model: usize) -> Option<Self> {
        ACTIVE_HOOKS.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&model) {
                return None;
            }
            active.push(model);
            Some(Self { model })
        })
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        ACTIVE_HOOKS.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(at) = active.iter().rposition(|m| *m == self.model) {
                active.remove(at);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_entry_for_the_same_model_is_refused() {
        let outer = HookGuard::enter(1);
        assert!(outer.is_some());
        assert!(HookGuard::enter(1).is_none());

        let other = HookGuard::enter(2);
        assert!(other.is_some());
        drop(other);

        drop(outer);
        assert!(HookGuard::enter(1).is_some());
    }
}
