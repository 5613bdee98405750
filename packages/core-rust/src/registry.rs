//! Per-thread slot holding the [`WaitContext`] the thread is working for.
//!
//! Only [`current`] is public. Installing a context goes through
//! [`ScopedContext`](crate::ScopedContext), which ties every install to a
//! lexical scope so a stale context cannot leak into unrelated work that
//! later runs on the same thread.

use std::cell::RefCell;
use std::sync::Arc;

use crate::code::ActivityCode;
use crate::messages::MetadataMessage;
use crate::metadata::ActivityMetadata;
use crate::wait_context::WaitContext;

thread_local! {
    static CURRENT: RefCell<Option<Arc<WaitContext>>> = const { RefCell::new(None) };
}

/// Returns the context installed on the calling thread, if any.
#[must_use]
pub fn current() -> Option<Arc<WaitContext>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Replaces the calling thread's context and returns the one it displaced.
pub(crate) fn set_current(ctx: Option<Arc<WaitContext>>) -> Option<Arc<WaitContext>> {
    CURRENT.with(|slot| slot.replace(ctx))
}

/// Sets `code` on the calling thread's context. No-op without one.
pub fn set_current_status(code: ActivityCode) {
    if let Some(ctx) = current() {
        ctx.set_activity_code(code);
    }
}

/// Merges a wire message into the calling thread's context metadata with the
/// usual override-if-present rule, so explicit zeros leave fields untouched.
/// No-op without a context.
pub fn update_current_metadata_from_wire(msg: &MetadataMessage) {
    if let Some(ctx) = current() {
        ctx.update_metadata(&ActivityMetadata::from_wire(msg));
    }
}
