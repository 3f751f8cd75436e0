//! Watch request records
//!
//! A WatchRequest is immutable once created; the store only moves it between
//! the active and hibernated sets.

use chrono::{DateTime, Utc};

use super::term::Doctor;
use crate::id::generate_request_id;

/// Portal login. Never logged: Debug redacts the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Doctor named by the requester, before it is resolved against the portal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorName {
    pub first_name: String,
    pub last_name: String,
}

/// An unresolved request as submitted by a caller
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub credentials: Credentials,
    pub service: String,
    pub doctor: Option<DoctorName>,
    pub notification_email: String,
    pub auto_book: bool,
}

/// One outstanding "tell me (or book) when this slot opens" request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    /// Stable unique identifier
    pub id: String,
    pub credentials: Credentials,
    /// Service name as it appears in the portal catalog
    pub service: String,
    /// Doctor resolved at creation time
    pub doctor: Option<Doctor>,
    pub notification_email: String,
    /// Book qualifying slots on the requester's behalf
    pub auto_book: bool,
    pub created_at: DateTime<Utc>,
}

impl WatchRequest {
    /// Create a request with a fresh id
    pub fn new(
        credentials: Credentials,
        service: impl Into<String>,
        notification_email: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_request_id(),
            credentials,
            service: service.into(),
            doctor: None,
            notification_email: notification_email.into(),
            auto_book: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_doctor(mut self, doctor: Doctor) -> Self {
        self.doctor = Some(doctor);
        self
    }

    pub fn with_auto_book(mut self, auto_book: bool) -> Self {
        self.auto_book = auto_book;
        self
    }

    pub fn login(&self) -> &str {
        &self.credentials.login
    }

    /// Deduplication identity: (login, service), case-insensitive
    pub fn matches(&self, login: &str, service: &str) -> bool {
        self.credentials.login.to_lowercase() == login.to_lowercase()
            && self.service.to_lowercase() == service.to_lowercase()
    }

    pub fn same_target(&self, other: &WatchRequest) -> bool {
        self.matches(&other.credentials.login, &other.service)
    }
}

/// A request parked after resolution, waiting to be re-armed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HibernatedRequest {
    pub request: WatchRequest,
    pub hibernated_at: DateTime<Utc>,
}
