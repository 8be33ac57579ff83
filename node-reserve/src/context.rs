use std::{
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
};

/// Identifies the execution context a reservation belongs to.
///
/// A context holds at most one active reservation per tree. Contexts are opaque: most callers use
/// [`ContextId::current`], which hands out one id per thread. Callers that schedule work for one
/// logical operation across threads can mint their own ids with [`ContextId::from_raw`] and carry
/// them along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(NonZeroU64);

// Ids handed out to threads. Starts at 1 so that zero never names a context.
static NEXT_THREAD_CONTEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CONTEXT: ContextId = ContextId::next_thread_context();
}

impl ContextId {
    /// The context of the calling thread. Stable for the lifetime of the thread.
    pub fn current() -> Self {
        THREAD_CONTEXT.with(|cx| *cx)
    }

    /// Use an externally assigned id.
    ///
    /// Such ids share one namespace with the ids given out by [`ContextId::current`]; callers
    /// mixing the two should draw raw ids from a range threads will not reach, e.g. the top half.
    pub const fn from_raw(raw: NonZeroU64) -> Self {
        ContextId(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }

    fn next_thread_context() -> Self {
        let raw = NEXT_THREAD_CONTEXT.fetch_add(1, Ordering::Relaxed);
        // UNWRAP: the counter starts at 1 and would take centuries to wrap.
        ContextId(NonZeroU64::new(raw).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::ContextId;

    #[test]
    fn current_is_stable_within_a_thread() {
        assert_eq!(ContextId::current(), ContextId::current());
    }

    #[test]
    fn threads_get_distinct_contexts() {
        let here = ContextId::current();
        let there = std::thread::spawn(ContextId::current).join().unwrap();
        assert_ne!(here, there);
    }
}
