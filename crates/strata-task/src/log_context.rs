//! Task-local logging context.
//!
//! Each worker thread keeps a stack of context frames in a `thread_local`.
//! [`push`]/[`pop`] (normally used via the [`with_context`] guard) adjust the
//! current thread's stack; [`current`] renders it into a single string for
//! attaching to a `tracing` span. Records themselves still go through
//! `tracing`'s own dispatch, so the "single logger thread" requirement is
//! satisfied by installing a non-blocking subscriber (see
//! [`crate::telemetry::init_tracing`]) rather than by this module routing
//! bytes itself.

use std::cell::RefCell;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Push a new frame onto the current thread's context stack.
pub fn push(frame: impl Into<String>) {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(frame.into()));
}

/// Pop the most recently pushed frame, if any.
pub fn pop() -> Option<String> {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().pop())
}

/// Render the current thread's context stack as a single `/`-joined string,
/// e.g. `"store.put/topic:orders"`. Empty when no frame is active.
pub fn current() -> String {
    CONTEXT_STACK.with(|stack| stack.borrow().join("/"))
}

/// Depth of the current thread's context stack.
pub fn depth() -> usize {
    CONTEXT_STACK.with(|stack| stack.borrow().len())
}

/// RAII guard that pushes `frame` on construction and pops on drop,
/// restoring the stack even if the enclosed work panics.
pub struct ContextGuard {
    _private: (),
}

/// Push `frame` for the duration of the returned guard's lifetime.
#[must_use = "the context frame is popped when this guard is dropped"]
pub fn with_context(frame: impl Into<String>) -> ContextGuard {
    push(frame);
    ContextGuard { _private: () }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        pop();
    }
}
