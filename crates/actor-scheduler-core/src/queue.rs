//! MPMC queue primitives: the process-wide injection queue and per-worker
//! run queues, both backed by `crossbeam-deque`.

use crossbeam_deque::{Injector as CbInjector, Steal, Stealer, Worker as CbWorker};

use crate::actor::ActorHandle;

/// Process-wide queue for actors scheduled from a context with no worker of
/// its own (a foreign thread, or any caller whose ctx is unbound).
pub struct GlobalQueue {
    inner: CbInjector<ActorHandle>,
}

impl GlobalQueue {
    pub fn new() -> Self {
        Self {
            inner: CbInjector::new(),
        }
    }

    /// Multi-producer push.
    pub fn push(&self, actor: ActorHandle) {
        self.inner.push(actor);
    }

    /// Multi-consumer pop. `Steal::Retry` is looped internally -- callers
    /// only see "got one" or "empty right now".
    pub fn pop(&self) -> Option<ActorHandle> {
        loop {
            match self.inner.steal() {
                Steal::Success(actor) => return Some(actor),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }
}

impl Default for GlobalQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A single worker's own run queue: single-producer (the owning worker),
/// multi-consumer (any worker's steal loop may pop from the `Stealer` it
/// hands out).
pub struct RunQueue {
    local: CbWorker<ActorHandle>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self {
            local: CbWorker::new_fifo(),
        }
    }

    /// Single-producer fast path: the owning worker pushing its own actor
    /// back onto the tail of its queue.
    pub fn push_single(&self, actor: ActorHandle) {
        self.local.push(actor);
    }

    /// Pop from the front, owner-side only.
    pub fn pop(&self) -> Option<ActorHandle> {
        self.local.pop()
    }

    /// A handle thieves use to steal from this queue. Distributed to every
    /// other worker at startup.
    pub fn stealer(&self) -> Stealer<ActorHandle> {
        self.local.stealer()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Pop with injection-queue priority: the priority the original scheduler
/// gives foreign-scheduled work over a worker's own backlog.
pub fn pop_global(injector: &GlobalQueue, own: &RunQueue) -> Option<ActorHandle> {
    injector.pop().or_else(|| own.pop())
}

/// Steal once from another worker's queue via its `Stealer` handle. Retries
/// internally on contention; a clean empty read returns `None`.
pub fn steal_from(stealer: &Stealer<ActorHandle>) -> Option<ActorHandle> {
    loop {
        match stealer.steal() {
            Steal::Success(actor) => return Some(actor),
            Steal::Empty => return None,
            Steal::Retry => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    struct DummyActor {
        muted: AtomicU64,
    }

    impl Actor for DummyActor {
        fn muted(&self) -> &AtomicU64 {
            &self.muted
        }

        fn is_unscheduled(&self) -> bool {
            false
        }
    }

    fn dummy() -> ActorHandle {
        Arc::new(DummyActor {
            muted: AtomicU64::new(0),
        })
    }

    #[test]
    fn global_queue_fifo_roundtrip() {
        let q = GlobalQueue::new();
        assert!(q.pop().is_none());
        let a = dummy();
        q.push(a.clone());
        let popped = q.pop().expect("pushed actor should pop");
        assert!(Arc::ptr_eq(&a, &popped));
        assert!(q.pop().is_none());
    }

    #[test]
    fn run_queue_push_pop() {
        let rq = RunQueue::new();
        assert!(rq.is_empty());
        rq.push_single(dummy());
        assert!(!rq.is_empty());
        assert!(rq.pop().is_some());
        assert!(rq.pop().is_none());
    }

    #[test]
    fn pop_global_prefers_injector() {
        let injector = GlobalQueue::new();
        let rq = RunQueue::new();
        let from_injector = dummy();
        let from_local = dummy();
        injector.push(from_injector.clone());
        rq.push_single(from_local.clone());

        let first = pop_global(&injector, &rq).unwrap();
        assert!(Arc::ptr_eq(&first, &from_injector));
        let second = pop_global(&injector, &rq).unwrap();
        assert!(Arc::ptr_eq(&second, &from_local));
        assert!(pop_global(&injector, &rq).is_none());
    }

    #[test]
    fn steal_from_stealer_sees_pushed_items() {
        let rq = RunQueue::new();
        let stealer = rq.stealer();
        rq.push_single(dummy());
        let stolen = steal_from(&stealer);
        assert!(stolen.is_some());
        assert!(steal_from(&stealer).is_none());
    }
}
