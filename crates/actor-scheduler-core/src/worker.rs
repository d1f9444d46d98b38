//! Per-worker state and the run/steal loops.
//!
//! Everything here except `WorkerShared`'s fields (which `Context` also
//! reaches into for `add`/`mute`) is local to the OS thread running the
//! loop -- no locking beyond the mute table, which is only ever touched by
//! its owning worker except through a drained control message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use crossbeam_deque::Stealer;
use crossbeam_utils::Backoff;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::actor::{ActorExecutor, ActorHandle};
use crate::asio::Asio;
use crate::config::SchedulerConfig;
use crate::context::{self, Context};
use crate::control::{send_msg, send_msg_all, ControlMsg};
use crate::cpu;
use crate::mute::MuteTable;
use crate::queue::{pop_global, steal_from, GlobalQueue, RunQueue};

/// State owned by one worker, reachable both from its run loop and from any
/// `Context` bound to it (so actor code can call `add`/`mute` while running
/// on this worker without going through a message).
pub struct WorkerShared {
    pub(crate) index: usize,
    pub(crate) run_queue: RunQueue,
    pub(crate) mute_table: Mutex<MuteTable>,
}

impl WorkerShared {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            run_queue: RunQueue::new(),
            mute_table: Mutex::new(MuteTable::new()),
        }
    }
}

/// Coordinator-only bookkeeping for the CNF/ACK quiescence protocol.
/// Constructed only for worker 0; every field is mutated solely on worker
/// 0's thread, in response to messages drained from its own mailbox.
struct CoordinatorState {
    worker_count: usize,
    block_count: usize,
    ack_token: u64,
    ack_count: usize,
    asio_stopped: bool,
}

impl CoordinatorState {
    fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            block_count: 0,
            ack_token: 0,
            ack_count: 0,
            asio_stopped: false,
        }
    }

    fn on_block(&mut self, pool: &Pool) {
        self.block_count += 1;
        debug!(block_count = self.block_count, "coordinator observed Block");
        if pool.detect_quiescence.load(Ordering::Relaxed) && self.block_count == self.worker_count
        {
            debug!(token = self.ack_token, "all workers blocked, broadcasting Cnf");
            send_msg_all(&pool.mailboxes, ControlMsg::Cnf(self.ack_token));
        }
    }

    fn on_unblock(&mut self, pool: &Pool) {
        debug_assert!(self.block_count > 0, "block_count underflowed on Unblock");
        self.block_count -= 1;
        self.ack_token += 1;
        self.ack_count = 0;
        if self.asio_stopped {
            let started = pool.asio.start();
            assert!(started, "asio failed to restart after Unblock");
            self.asio_stopped = false;
        }
    }

    fn on_ack(&mut self, pool: &Pool, token: u64) {
        if token != self.ack_token {
            trace!(token, current = self.ack_token, "dropping stale Ack");
            return;
        }
        self.ack_count += 1;
        if self.ack_count != self.worker_count {
            return;
        }
        if self.asio_stopped {
            info!("quiescence confirmed twice, broadcasting Terminate");
            send_msg_all(&pool.mailboxes, ControlMsg::Terminate);
        } else if pool.asio.stop() {
            self.asio_stopped = true;
            self.ack_token += 1;
            self.ack_count = 0;
            debug!("asio stopped, re-verifying with a fresh Cnf round");
            send_msg_all(&pool.mailboxes, ControlMsg::Cnf(self.ack_token));
        }
    }
}

/// The immutable (post-construction), shared-across-threads half of a
/// running scheduler. One `Arc<Pool>` is cloned into every worker thread.
pub(crate) struct Pool {
    pub injector: GlobalQueue,
    pub workers: Vec<Arc<WorkerShared>>,
    pub stealers: Vec<Stealer<ActorHandle>>,
    pub mailboxes: Vec<Sender<ControlMsg>>,
    pub executor: Arc<dyn ActorExecutor>,
    pub asio: Arc<dyn Asio>,
    pub detect_quiescence: Arc<AtomicBool>,
    pub config: SchedulerConfig,
}

/// Entry point run on each worker's dedicated OS thread.
pub(crate) fn worker_loop(pool: Arc<Pool>, index: usize, rx: Receiver<ControlMsg>) {
    let shared = pool.workers[index].clone();
    let ctx = Context::for_worker(shared.clone());
    context::set_current(ctx.clone());

    if !pool.config.no_pin {
        cpu::pin_current_thread(index);
    }

    let mut terminate = false;
    let mut asio_noisy = false;
    let mut last_victim = index;
    let mut coordinator = if index == 0 {
        Some(CoordinatorState::new(pool.workers.len()))
    } else {
        None
    };

    let mut cur = pop_global(&pool.injector, &shared.run_queue);

    info!(worker = index, "worker started");

    loop {
        let changed = drain_mailbox(
            &pool,
            &rx,
            &shared,
            &mut asio_noisy,
            &mut terminate,
            &mut coordinator,
        );
        if changed && cur.is_none() {
            cur = pop_global(&pool.injector, &shared.run_queue);
        }

        if cur.is_none() {
            cur = steal_loop(
                &pool,
                index,
                &rx,
                &shared,
                &mut last_victim,
                &mut asio_noisy,
                &mut terminate,
                &mut coordinator,
            );
            if cur.is_none() {
                break;
            }
        }

        let actor = cur.take().expect("checked non-empty above");
        let reschedule = pool.executor.run_actor(&ctx, &actor, pool.config.batch_size);
        let next = pop_global(&pool.injector, &shared.run_queue);

        cur = match (reschedule, next) {
            (true, Some(next)) => {
                shared.run_queue.push_single(actor);
                Some(next)
            }
            (true, None) => Some(actor),
            (false, next) => next,
        };
    }

    debug_assert!(shared.run_queue.is_empty(), "worker exited with work left queued");
    info!(worker = index, "worker terminated");
    context::clear_current();
}

/// Drain every pending control message. Returns whether an `UnmuteActor`
/// rescheduled at least one actor onto this worker's own run queue.
fn drain_mailbox(
    pool: &Pool,
    rx: &Receiver<ControlMsg>,
    shared: &WorkerShared,
    asio_noisy: &mut bool,
    terminate: &mut bool,
    coordinator: &mut Option<CoordinatorState>,
) -> bool {
    let mut run_queue_changed = false;
    while let Ok(msg) = rx.try_recv() {
        match msg {
            ControlMsg::Block => {
                if let Some(coord) = coordinator.as_mut() {
                    coord.on_block(pool);
                }
            }
            ControlMsg::Unblock => {
                if let Some(coord) = coordinator.as_mut() {
                    coord.on_unblock(pool);
                }
            }
            ControlMsg::Cnf(token) => {
                send_msg(&pool.mailboxes[0], ControlMsg::Ack(token));
            }
            ControlMsg::Ack(token) => {
                if let Some(coord) = coordinator.as_mut() {
                    coord.on_ack(pool, token);
                }
            }
            ControlMsg::Terminate => {
                *terminate = true;
            }
            ControlMsg::UnmuteActor(receiver) => {
                let drained = shared.mute_table.lock().unmute_senders(&receiver);
                for sender in drained {
                    if !sender.is_unscheduled() {
                        shared.run_queue.push_single(sender.clone());
                        run_queue_changed = true;
                    }
                    send_msg_all(&pool.mailboxes, ControlMsg::UnmuteActor(sender));
                }
            }
            ControlMsg::NoisyAsio => *asio_noisy = true,
            ControlMsg::UnnoisyAsio => *asio_noisy = false,
        }
    }
    run_queue_changed
}

/// Backward-walking victim cursor. Returns the chosen victim index, or
/// `None` if there's no other worker to steal from (a single-worker pool).
/// The injection queue is not reachable only through this `None` case --
/// `steal_loop` polls it unconditionally every iteration -- this just
/// decides whether a victim's run queue is worth trying this time around.
fn choose_victim(worker_count: usize, self_index: usize, last_victim: usize) -> Option<usize> {
    if worker_count <= 1 {
        return None;
    }
    let mut candidate = last_victim;
    for _ in 0..worker_count {
        candidate = if candidate == 0 {
            worker_count - 1
        } else {
            candidate - 1
        };
        if candidate != self_index {
            return Some(candidate);
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn steal_loop(
    pool: &Pool,
    index: usize,
    rx: &Receiver<ControlMsg>,
    shared: &WorkerShared,
    last_victim: &mut usize,
    asio_noisy: &mut bool,
    terminate: &mut bool,
    coordinator: &mut Option<CoordinatorState>,
) -> Option<ActorHandle> {
    let worker_count = pool.workers.len();
    let started_at = Instant::now();
    let mut steal_attempts = 0usize;
    let mut block_sent = false;
    let idle = Backoff::new();

    let found = loop {
        if *terminate {
            break None;
        }

        // The injection queue is polled every iteration, independent of
        // victim selection -- mirroring the original's `pop_global(victim)`,
        // which checks the inject queue before ever touching a victim's run
        // queue. `choose_victim` almost always finds a non-self candidate
        // for any `worker_count >= 2`, so relying on its `None` case as the
        // sole path to the injector would starve foreign-scheduled work.
        if let Some(actor) = pool.injector.pop() {
            break Some(actor);
        }

        let stolen = match choose_victim(worker_count, index, *last_victim) {
            Some(victim) => {
                *last_victim = victim;
                steal_from(&pool.stealers[victim])
            }
            None => {
                *last_victim = index;
                None
            }
        };
        if stolen.is_some() {
            break stolen;
        }

        steal_attempts += 1;

        if drain_mailbox(pool, rx, shared, asio_noisy, terminate, coordinator) {
            if let Some(actor) = pop_global(&pool.injector, &shared.run_queue) {
                break Some(actor);
            }
        }
        if *terminate {
            break None;
        }

        if !block_sent
            && steal_attempts >= worker_count
            && started_at.elapsed() >= pool.config.block_latch
            && !*asio_noisy
            && shared.mute_table.lock().is_empty()
        {
            trace!(worker = index, "sending Block after exhausting all victims");
            send_msg(&pool.mailboxes[0], ControlMsg::Block);
            block_sent = true;
        }

        if pool.config.no_yield {
            idle.spin();
        } else {
            idle.snooze();
        }
    };

    if found.is_some() && block_sent {
        send_msg(&pool.mailboxes[0], ControlMsg::Unblock);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_victim_skips_self_and_wraps() {
        // 4 workers, self is 2, last_victim starts at self.
        let v1 = choose_victim(4, 2, 2).expect("should find a victim");
        assert_eq!(v1, 1);
        let v2 = choose_victim(4, 2, v1).expect("should find a victim");
        assert_eq!(v2, 0);
        let v3 = choose_victim(4, 2, v2).expect("should wrap to the end");
        assert_eq!(v3, 3);
    }

    #[test]
    fn choose_victim_with_single_worker_returns_none() {
        assert_eq!(choose_victim(1, 0, 0), None);
    }
}
