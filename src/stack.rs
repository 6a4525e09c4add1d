//! Stack growth for the recursive passes.
//!
//! Parsing, resolving and evaluating all recurse once per nesting level of
//! the source, so deeply nested code would otherwise overflow the host stack.

/// Remaining stack below which the stack is grown.
const RED_ZONE: usize = 128 * 1024;

/// How much stack each growth allocates.
const STACK_PER_RECURSION: usize = 2 * 1024 * 1024;

/// Runs `f`, first growing the stack if less than the red zone is left.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
