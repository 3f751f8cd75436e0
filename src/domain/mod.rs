//! Domain types for slotwatch
//!
//! - WatchRequest: one outstanding request, plus its hibernated form
//! - Outcome: result of a single booking evaluation
//! - ServiceVariant, Doctor, Term: the portal's catalog and slot records

pub mod outcome;
pub mod request;
pub mod term;

pub use outcome::Outcome;
pub use request::{Credentials, DoctorName, HibernatedRequest, NewRequest, WatchRequest};
pub use term::{BookingConfirmation, Doctor, LockHandle, ServiceVariant, Term, TermsForDay};
