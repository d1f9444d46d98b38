//! Tunable constants, collected into one struct instead of scattered consts.

use std::time::Duration;

/// Knobs that influence scheduling policy but never its correctness.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads. `None` means "ask the OS" via
    /// [`std::thread::available_parallelism`].
    pub threads: Option<usize>,

    /// Number of actor-queue messages `run_actor` is allowed to process
    /// before yielding the actor back to the queue.
    pub batch_size: usize,

    /// How long a steal loop runs dry before it is allowed to send `Block`,
    /// once it has also tried every other worker at least once.
    pub block_latch: Duration,

    /// Disable `thread::yield_now()` in the steal-loop backoff ladder; busy
    /// spin/sleep only. Useful on systems where yielding to the scheduler is
    /// itself expensive.
    pub no_yield: bool,

    /// Disable CPU affinity pinning for worker threads entirely.
    pub no_pin: bool,

    /// Reserve a dedicated core for the embedder's ASIO collaborator
    /// (beyond the worker set, when the platform allows discovering one).
    /// The scheduler can't pin a thread it doesn't own, so this only
    /// computes the reservation -- query it back via `Scheduler::asio_cpu`
    /// and pin your own ASIO thread to it.
    pub pin_asio: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: None,
            batch_size: 100,
            block_latch: Duration::from_millis(1),
            no_yield: false,
            no_pin: false,
            pin_asio: false,
        }
    }
}
