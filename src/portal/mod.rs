//! Appointment portal access.
//!
//! `PortalClient::login` yields an authenticated `PortalSession`; every
//! session call is a suspension point and may fail with
//! `SlotwatchError::RateLimited`, which callers must keep distinct from all
//! other failures.

pub mod luxmed;
pub mod mock;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{BookingConfirmation, Credentials, Doctor, LockHandle, ServiceVariant, Term, TermsForDay};
use crate::error::Result;

pub use luxmed::{LuxmedConfig, LuxmedPortal};
pub use mock::MockPortal;

/// Logs a requester into the portal
#[async_trait]
pub trait PortalClient: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Box<dyn PortalSession>>;
}

/// An authenticated portal session
#[async_trait]
pub trait PortalSession: Send + Sync {
    /// Catalog lookup by service name, case-insensitive exact match
    async fn find_variant(&self, service: &str) -> Result<Option<ServiceVariant>>;

    /// Doctor lookup within a variant by first+last name, case-insensitive
    async fn find_doctor(&self, variant_id: i64, first_name: &str, last_name: &str) -> Result<Option<Doctor>>;

    /// Open slots for one date window, inclusive on both ends
    async fn search_terms(
        &self,
        variant: &ServiceVariant,
        doctor_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TermsForDay>>;

    /// Temporarily reserve a slot
    async fn lock_term(&self, term: &Term, variant: &ServiceVariant) -> Result<LockHandle>;

    /// Confirm a previously locked slot
    async fn book(&self, lock: &LockHandle, term: &Term, variant: &ServiceVariant) -> Result<BookingConfirmation>;
}
