//! RAII guards for installing a context and for scoping an activity code.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::code::ActivityCode;
use crate::registry;
use crate::wait_context::WaitContext;

// ---------------------------------------------------------------------------
// ScopedContext
// ---------------------------------------------------------------------------

/// Installs a context on the current thread for the guard's lifetime.
///
/// On drop, including during unwinding, the context that was installed before
/// the guard was created is put back. Nested guards therefore restore the
/// chain in reverse order. The guard is `!Send`: it must be dropped on the
/// thread whose slot it modified.
#[must_use = "the context is uninstalled as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopedContext {
    prev: Option<Arc<WaitContext>>,
    _not_send: PhantomData<*const ()>,
}

impl ScopedContext {
    /// Installs `ctx` (or clears the slot for `None`).
    pub fn new(ctx: Option<Arc<WaitContext>>) -> Self {
        Self {
            prev: registry::set_current(ctx),
            _not_send: PhantomData,
        }
    }

    /// Installs a clone of `ctx`.
    pub fn enter(ctx: &Arc<WaitContext>) -> Self {
        Self::new(Some(Arc::clone(ctx)))
    }
}

impl Drop for ScopedContext {
    fn drop(&mut self) {
        registry::set_current(self.prev.take());
    }
}

// ---------------------------------------------------------------------------
// ScopedStatus
// ---------------------------------------------------------------------------

/// Sets an activity code for the guard's lifetime.
///
/// On drop, or on [`reset_to_prev`](Self::reset_to_prev), the code that was
/// current when the guard was created is restored, but only if the context
/// still holds the code this guard set. If another writer changed it in the
/// meantime the newer code is left alone. Under such races the previous code
/// may never come back; codes are diagnostic, so this is accepted.
///
/// Without a context the guard does nothing.
#[must_use = "the previous status is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopedStatus {
    ctx: Option<Arc<WaitContext>>,
    code: ActivityCode,
    prev: ActivityCode,
}

impl ScopedStatus {
    /// Sets `code` on the context installed on the calling thread.
    pub fn new(code: ActivityCode) -> Self {
        Self::for_context(registry::current(), code)
    }

    /// Sets `code` on an explicit context.
    pub fn for_context(ctx: Option<Arc<WaitContext>>, code: ActivityCode) -> Self {
        let prev = ctx
            .as_ref()
            .map_or(ActivityCode::UNUSED, |ctx| ctx.replace_activity_code(code));
        Self { ctx, code, prev }
    }

    /// The code this guard set.
    #[must_use]
    pub fn code(&self) -> ActivityCode {
        self.code
    }

    /// The code that was current when this guard was created.
    #[must_use]
    pub fn prev(&self) -> ActivityCode {
        self.prev
    }

    /// Restores the previous code now instead of at drop, subject to the same
    /// compare-then-restore rule.
    pub fn reset_to_prev(&self) {
        if let Some(ctx) = &self.ctx {
            ctx.compare_and_set_activity_code(self.code, self.prev);
        }
    }
}

impl Drop for ScopedStatus {
    fn drop(&mut self) {
        self.reset_to_prev();
    }
}
