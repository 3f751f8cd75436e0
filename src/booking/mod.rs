//! Booking decisions: what to do once a watch fires.

mod decider;
mod engine;
mod resolve;

pub use decider::{AutoBookRule, DEFAULT_MIN_LEAD_HOURS, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS, SearchWindow};
pub use engine::BookingEngine;
pub use resolve::resolve_request;
