//! Scheduling of per-request watches.
//!
//! - **Backoff**: delay growth after the portal rate-limits a poll.
//! - **WatchScheduler**: one cancellable polling loop per request id.

mod backoff;
mod watch;

pub use backoff::{BackoffDecision, BackoffPolicy, DEFAULT_ESCALATION_CEILING, DEFAULT_FIRST_PENALTY};
pub use watch::{SchedulerConfig, WatchAction, WatchExit, WatchScheduler, WatchSnapshot, WatchState};
