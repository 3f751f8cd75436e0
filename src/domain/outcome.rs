//! Poll outcome types.
//!
//! This module defines the result of one booking evaluation.

use serde::Serialize;

/// Outcome of evaluating one request against the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Service name not in the catalog - keep waiting
    VariantNotFound,
    /// No in-person slots in the lookahead window - keep waiting
    NoAppointmentsFound,
    /// Requester notified that slots are available
    EmailSent,
    /// Auto-booking failed, requester notified instead
    BookOnBehalfFailedEmailSent,
    /// Slot locked and booked for the requester
    BookedOnBehalf,
}

impl Outcome {
    /// Terminal outcomes resolve the request; the others permit another poll
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::VariantNotFound | Outcome::NoAppointmentsFound)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::VariantNotFound => "variant_not_found",
            Outcome::NoAppointmentsFound => "no_appointments_found",
            Outcome::EmailSent => "email_sent",
            Outcome::BookOnBehalfFailedEmailSent => "book_on_behalf_failed_email_sent",
            Outcome::BookedOnBehalf => "booked_on_behalf",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
