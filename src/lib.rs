//! Slotwatch - watches a patient portal for appointment slots
//!
//! Each outstanding request gets its own polling loop that searches the
//! portal, emails the requester or books on their behalf once a slot opens,
//! and backs off when the portal rate-limits it.

pub mod booking;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod id;
pub mod notify;
pub mod portal;
pub mod scheduler;
pub mod store;

pub use error::{Result, SlotwatchError};
