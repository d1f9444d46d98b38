//! The scheduler's view of an actor: opaque save for the three fields it
//! needs to make scheduling decisions.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Everything the scheduler needs to know about a runnable unit of work.
///
/// Message delivery, pattern matching, and supervision live entirely outside
/// this crate; an implementor plugs its own actor representation in here.
pub trait Actor: Send + Sync {
    /// Number of receivers for which this actor is currently a muted
    /// sender. Reaches zero exactly when the actor becomes reschedulable
    /// again after having been parked by backpressure.
    fn muted(&self) -> &AtomicU64;

    /// True once the actor has been removed from scheduling entirely (e.g.
    /// it exited). A muted actor that is also unscheduled is never
    /// rescheduled by `unmute_senders`.
    fn is_unscheduled(&self) -> bool;
}

/// A scheduled unit, reference-counted so queues, mute tables, and control
/// messages can all hold a handle cheaply.
pub type ActorHandle = Arc<dyn Actor>;

/// Identity of an actor handle for use as a map/set key. Two clones of the
/// same `Arc` produce the same id; unrelated actors never collide for the
/// lifetime of either.
pub type ActorId = usize;

pub(crate) fn actor_id(handle: &ActorHandle) -> ActorId {
    Arc::as_ptr(handle) as *const () as ActorId
}

/// The contract the out-of-scope actor execution primitive must satisfy.
///
/// Invoked once per run-loop iteration with a bounded batch size; returns
/// whether the actor still has pending work and should be rescheduled.
pub trait ActorExecutor: Send + Sync {
    fn run_actor(&self, ctx: &crate::context::Context, actor: &ActorHandle, batch: usize) -> bool;
}
