//! Work-stealing M:N actor scheduler core.
//!
//! Owns a fixed pool of worker threads, dispatches runnable actors onto
//! them, balances load with work-stealing, throttles overloaded actors
//! through a per-worker mute table, and detects whole-program quiescence
//! with a two-phase CNF/ACK protocol so an embedder can terminate cleanly.
//!
//! Actor execution itself, message delivery, and cycle collection are out
//! of scope -- this crate only needs the [`ActorExecutor`], [`Actor`],
//! [`Asio`], and [`CycleDetector`] contracts to drive the pool.

mod actor;
mod asio;
mod config;
mod context;
mod control;
mod cpu;
mod cycle;
mod error;
mod mute;
mod queue;
mod scheduler;
mod worker;

pub use actor::{Actor, ActorExecutor, ActorHandle};
pub use asio::{Asio, NullAsio};
pub use config::SchedulerConfig;
pub use context::Context;
pub use cpu::core_count;
pub use cycle::{CycleDetector, NoopCycleDetector};
pub use error::SchedulerError;
pub use scheduler::Scheduler;
