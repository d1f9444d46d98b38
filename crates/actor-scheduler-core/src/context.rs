//! Per-thread execution context: distinguishes "I am running on worker N"
//! from "I am a registered foreign thread with no worker of my own".

use std::cell::RefCell;
use std::sync::Arc;

use crate::worker::WorkerShared;

thread_local! {
    static CURRENT_CTX: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// Handle passed to actor code and used internally by `add`/`mute` to
/// decide whether to target a worker's own queue/table or fall back to the
/// injection queue.
#[derive(Clone)]
pub struct Context {
    worker: Option<Arc<WorkerShared>>,
}

impl Context {
    pub(crate) fn for_worker(shared: Arc<WorkerShared>) -> Self {
        Self {
            worker: Some(shared),
        }
    }

    pub(crate) fn foreign() -> Self {
        Self { worker: None }
    }

    /// Index of the worker this context is bound to, or `None` for a
    /// registered foreign thread.
    pub fn worker_index(&self) -> Option<usize> {
        self.worker.as_ref().map(|w| w.index)
    }

    pub(crate) fn worker_shared(&self) -> Option<&Arc<WorkerShared>> {
        self.worker.as_ref()
    }
}

/// Bind `ctx` to the calling thread. Called once by each spawned worker
/// thread and by `register_thread` for foreign callers.
pub(crate) fn set_current(ctx: Context) {
    CURRENT_CTX.with(|cell| *cell.borrow_mut() = Some(ctx));
}

pub(crate) fn clear_current() {
    CURRENT_CTX.with(|cell| *cell.borrow_mut() = None);
}

/// The calling thread's context, if it has registered.
pub fn current() -> Option<Context> {
    CURRENT_CTX.with(|cell| cell.borrow().clone())
}
