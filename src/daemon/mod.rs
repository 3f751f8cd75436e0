//! Daemon core: periodic trigger and keep-alive
//!
//! The daemon is the long-running process that:
//! - Re-arms a watch for every active request on each tick
//! - Optionally pings a URL so the hosting process stays warm

pub mod keep_alive;
pub mod tick;

pub use keep_alive::KeepAlive;
pub use tick::{Daemon, TickConfig, watch_action};
