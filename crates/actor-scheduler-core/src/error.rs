//! Error taxonomy for the scheduler's public surface.
//!
//! Internal protocol invariants (sender != receiver, muted > 0 at decrement,
//! a registered ctx exists) are enforced by assertions, not by this type --
//! they are programming errors, not conditions a caller can recover from.
//! This enum only covers resource exhaustion and lifecycle misuse, both of
//! which a caller can reasonably observe and react to.

use thiserror::Error;

/// Errors returned from the scheduler's embedding API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `Scheduler::init` was called while a scheduler was already running
    /// in this process.
    #[error("scheduler already initialized")]
    AlreadyInitialized,

    /// A worker OS thread could not be spawned.
    #[error("failed to spawn worker thread {index}: {source}")]
    ThreadSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// The ASIO collaborator failed to start.
    #[error("asio subsystem failed to start")]
    AsioStartFailed,

    /// `ctx()` or a scheduling call was made from a thread that never
    /// called `register_thread`.
    #[error("current thread is not registered with the scheduler")]
    NotRegistered,
}
