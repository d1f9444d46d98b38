//! Scheduler lifecycle: init, start, stop, thread registration, and the
//! scheduling/mute/asio entry points exposed to the embedder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::info;

use crate::actor::{ActorExecutor, ActorHandle};
use crate::asio::Asio;
use crate::config::SchedulerConfig;
use crate::context::{self, Context};
use crate::control::{send_msg_all, ControlMsg, Mailbox};
use crate::cpu;
use crate::cycle::CycleDetector;
use crate::error::SchedulerError;
use crate::queue::GlobalQueue;
use crate::worker::{self, Pool, WorkerShared};

/// Guards against more than one live `Scheduler` per process -- the pool,
/// injection queue, and `detect_quiescence` flag are process-wide
/// singletons for the lifetime of one `init`/`stop` pair.
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Owns the worker pool for its entire `init` -> `stop` lifetime.
pub struct Scheduler {
    pool: Arc<Pool>,
    receivers: Mutex<Vec<Option<Receiver<ControlMsg>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cycle_detector: Arc<dyn CycleDetector>,
    detect_quiescence: Arc<AtomicBool>,
    asio_cpu: Option<usize>,
}

impl Scheduler {
    /// Allocate the worker pool. Rejects a second concurrent instance with
    /// `SchedulerError::AlreadyInitialized`.
    pub fn init(
        config: SchedulerConfig,
        executor: Arc<dyn ActorExecutor>,
        asio: Arc<dyn Asio>,
        cycle_detector: Arc<dyn CycleDetector>,
    ) -> Result<Self, SchedulerError> {
        if INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyInitialized);
        }

        let threads = config.threads.unwrap_or_else(cpu::core_count).max(1);
        let asio_cpu = cpu::assign_asio_cpu(threads, config.pin_asio);
        let workers: Vec<Arc<WorkerShared>> =
            (0..threads).map(|i| Arc::new(WorkerShared::new(i))).collect();
        let stealers = workers.iter().map(|w| w.run_queue.stealer()).collect();

        let mut mailboxes = Vec::with_capacity(threads);
        let mut receivers = Vec::with_capacity(threads);
        for _ in 0..threads {
            let (tx, rx) = Mailbox::new().into_parts();
            mailboxes.push(tx);
            receivers.push(Some(rx));
        }

        let detect_quiescence = Arc::new(AtomicBool::new(false));
        let pool = Arc::new(Pool {
            injector: GlobalQueue::new(),
            workers,
            stealers,
            mailboxes,
            executor,
            asio,
            detect_quiescence: Arc::clone(&detect_quiescence),
            config,
        });

        info!(threads, asio_cpu = ?asio_cpu, "scheduler initialized");
        Ok(Self {
            pool,
            receivers: Mutex::new(receivers),
            handles: Mutex::new(Vec::new()),
            cycle_detector,
            detect_quiescence,
            asio_cpu,
        })
    }

    /// Register the calling thread, start the ASIO collaborator, and spawn
    /// every worker thread. If `library` is false, also blocks here until
    /// quiescence tears the pool down (the same join loop `stop` uses).
    pub fn start(&self, library: bool) -> Result<bool, SchedulerError> {
        context::set_current(Context::foreign());

        if let Some(cpu) = self.asio_cpu {
            info!(cpu, "pin_asio armed -- embedder should pin its asio thread to this core");
        }

        if !self.pool.asio.start() {
            return Err(SchedulerError::AsioStartFailed);
        }
        self.detect_quiescence.store(!library, Ordering::Relaxed);

        self.spawn_workers()?;

        if !library {
            self.join_workers();
            self.finish_shutdown();
        }
        Ok(true)
    }

    /// Arm quiescence detection and tear the pool down. Meaningful when
    /// `start` was called with `library = true`; otherwise `start` already
    /// returned only once shutdown had completed.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        self.detect_quiescence.store(true, Ordering::Relaxed);
        self.join_workers();
        self.finish_shutdown();
        Ok(())
    }

    /// Schedule `actor` on the caller's own worker queue, or the injection
    /// queue if the caller isn't running on a worker.
    pub fn add(&self, ctx: &Context, actor: ActorHandle) {
        match ctx.worker_shared() {
            Some(shared) => shared.run_queue.push_single(actor),
            None => self.pool.injector.push(actor),
        }
    }

    /// Record that `sender` is parked on `receiver`, in the mute table of
    /// the worker `ctx` is bound to. Panics if `ctx` has no worker -- muting
    /// is only meaningful from code actually running on one.
    pub fn mute(&self, ctx: &Context, sender: &ActorHandle, receiver: &ActorHandle) {
        let shared = ctx
            .worker_shared()
            .expect("mute() called from a context not bound to a worker");
        shared.mute_table.lock().mute(sender, receiver);
    }

    /// Broadcast to every worker: "if you hold `actor` as a receiver key,
    /// unmute its senders." The public entry point for a runtime deciding a
    /// previously overloaded actor has drained.
    pub fn start_global_unmute(&self, actor: &ActorHandle) {
        send_msg_all(&self.pool.mailboxes, ControlMsg::UnmuteActor(actor.clone()));
    }

    pub fn noisy_asio(&self) {
        send_msg_all(&self.pool.mailboxes, ControlMsg::NoisyAsio);
    }

    pub fn unnoisy_asio(&self) {
        send_msg_all(&self.pool.mailboxes, ControlMsg::UnnoisyAsio);
    }

    pub fn cores(&self) -> usize {
        self.pool.workers.len()
    }

    /// The core index `SchedulerConfig::pin_asio` reserved for the
    /// embedder's ASIO collaborator, if any. `None` when `pin_asio` is
    /// false or no affinity information was available at `init`. The
    /// scheduler can't pin a thread it doesn't own, so this is exposed for
    /// the embedder to apply to its own ASIO thread.
    pub fn asio_cpu(&self) -> Option<usize> {
        self.asio_cpu
    }

    /// Bind a ctx-only context to the calling foreign thread.
    pub fn register_thread(&self) {
        context::set_current(Context::foreign());
    }

    pub fn unregister_thread(&self) {
        context::clear_current();
    }

    /// The calling thread's context. Errors if it never registered (and
    /// isn't a worker thread, which registers itself automatically).
    pub fn ctx(&self) -> Result<Context, SchedulerError> {
        context::current().ok_or(SchedulerError::NotRegistered)
    }

    fn spawn_workers(&self) -> Result<(), SchedulerError> {
        let mut receivers = self.receivers.lock();
        let mut handles = self.handles.lock();
        for index in 0..self.pool.workers.len() {
            let rx = receivers[index]
                .take()
                .expect("worker thread already spawned for this index");
            let pool = Arc::clone(&self.pool);
            let handle = thread::Builder::new()
                .name(format!("actor-worker-{index}"))
                .spawn(move || worker::worker_loop(pool, index, rx))
                .map_err(|source| SchedulerError::ThreadSpawn { index, source })?;
            handles.push(handle);
        }
        Ok(())
    }

    fn join_workers(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn finish_shutdown(&self) {
        let ctx = context::current().unwrap_or_else(Context::foreign);
        self.cycle_detector.terminate(&ctx);
        context::clear_current();
        INITIALIZED.store(false, Ordering::SeqCst);
        info!("scheduler shut down");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        INITIALIZED.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asio::NullAsio;
    use crate::cycle::NoopCycleDetector;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    // `INITIALIZED` is one static per test binary; serialize every test
    // that constructs a Scheduler so they don't race on it.
    static TEST_GUARD: Mutex<()> = Mutex::new(());

    struct NoopExecutor;
    impl ActorExecutor for NoopExecutor {
        fn run_actor(&self, _ctx: &Context, _actor: &ActorHandle, _batch: usize) -> bool {
            false
        }
    }

    fn init_scheduler(threads: usize) -> Scheduler {
        let mut config = SchedulerConfig::default();
        config.threads = Some(threads);
        Scheduler::init(
            config,
            Arc::new(NoopExecutor),
            Arc::new(NullAsio),
            Arc::new(NoopCycleDetector),
        )
        .expect("init should succeed")
    }

    #[test]
    fn double_init_is_rejected() {
        let _guard = TEST_GUARD.lock();
        let first = init_scheduler(2);
        let err = Scheduler::init(
            SchedulerConfig::default(),
            Arc::new(NoopExecutor),
            Arc::new(NullAsio),
            Arc::new(NoopCycleDetector),
        )
        .expect_err("a second concurrent scheduler must be rejected");
        assert!(matches!(err, SchedulerError::AlreadyInitialized));
        first.stop().expect("stop should succeed");
    }

    #[test]
    fn init_allowed_again_after_stop() {
        let _guard = TEST_GUARD.lock();
        let first = init_scheduler(1);
        first.stop().expect("stop should succeed");
        let second = init_scheduler(1);
        second.stop().expect("stop should succeed");
    }

    #[test]
    fn quiescence_with_no_work_terminates_promptly() {
        let _guard = TEST_GUARD.lock();
        let scheduler = init_scheduler(4);
        let started = std::time::Instant::now();
        scheduler.start(false).expect("start should succeed");
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "idle pool should quiesce and terminate quickly"
        );
    }

    #[test]
    fn library_mode_returns_immediately_and_stop_joins() {
        let _guard = TEST_GUARD.lock();
        let scheduler = init_scheduler(2);
        let count = Arc::new(AtomicUsize::new(0));
        scheduler.start(true).expect("start should succeed");
        count.fetch_add(1, Ordering::Relaxed);
        scheduler.stop().expect("stop should succeed");
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
