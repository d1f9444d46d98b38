//! Thin demo binary: wires a trivial counting actor to the scheduler so the
//! whole pipeline (spawn, steal, quiesce, terminate) can be exercised by
//! hand. Not part of the crate's embedding contract.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::info;
use tracing_subscriber::EnvFilter;

use actor_scheduler_core::{
    Actor, ActorExecutor, ActorHandle, Context, NoopCycleDetector, NullAsio, Scheduler,
    SchedulerConfig,
};

/// An actor with no state the scheduler itself cares about beyond the two
/// fields its `Actor` contract requires.
struct CountingActor {
    muted: AtomicU64,
    unscheduled: AtomicBool,
}

impl Actor for CountingActor {
    fn muted(&self) -> &AtomicU64 {
        &self.muted
    }

    fn is_unscheduled(&self) -> bool {
        self.unscheduled.load(Ordering::Relaxed)
    }
}

/// Decrements a per-actor message budget by up to `batch` each call;
/// reports `reschedule = true` until the budget hits zero. Identity is
/// tracked by actor-handle pointer since the demo actor carries no id of
/// its own.
struct CountdownExecutor {
    remaining: Mutex<FxHashMap<usize, u64>>,
}

impl CountdownExecutor {
    fn new() -> Self {
        Self {
            remaining: Mutex::new(FxHashMap::default()),
        }
    }

    fn seed(&self, actor: &ActorHandle, messages: u64) {
        self.remaining.lock().insert(handle_key(actor), messages);
    }
}

fn handle_key(actor: &ActorHandle) -> usize {
    Arc::as_ptr(actor) as *const () as usize
}

impl ActorExecutor for CountdownExecutor {
    fn run_actor(&self, _ctx: &Context, actor: &ActorHandle, batch: usize) -> bool {
        let key = handle_key(actor);
        let mut table = self.remaining.lock();
        let Some(count) = table.get_mut(&key) else {
            return false;
        };
        let step = (*count).min(batch as u64);
        *count -= step;
        let remaining = *count;
        if remaining == 0 {
            table.remove(&key);
        }
        remaining > 0
    }
}

#[derive(Parser)]
#[command(about = "Drive actor-scheduler-core with a handful of trivial counting actors")]
struct Args {
    /// Number of worker threads (defaults to the physical core count).
    #[arg(long)]
    threads: Option<usize>,

    /// Number of demo actors to spawn.
    #[arg(long, default_value_t = 8)]
    actors: usize,

    /// Messages each demo actor "processes" before exiting.
    #[arg(long, default_value_t = 1000)]
    messages: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    info!(
        threads = ?args.threads,
        actors = args.actors,
        messages = args.messages,
        "starting actor-scheduler-cli demo run"
    );

    let config = SchedulerConfig {
        threads: args.threads,
        ..SchedulerConfig::default()
    };

    let executor = Arc::new(CountdownExecutor::new());
    let scheduler = Scheduler::init(
        config,
        executor.clone(),
        Arc::new(NullAsio),
        Arc::new(NoopCycleDetector),
    )
    .expect("scheduler init failed");

    scheduler.register_thread();
    let ctx = scheduler.ctx().expect("thread just registered");

    for _ in 0..args.actors {
        let actor: ActorHandle = Arc::new(CountingActor {
            muted: AtomicU64::new(0),
            unscheduled: AtomicBool::new(false),
        });
        executor.seed(&actor, args.messages);
        scheduler.add(&ctx, actor);
    }

    scheduler
        .start(false)
        .expect("scheduler start/run failed");

    info!("all demo actors quiesced, scheduler shut down");
}
