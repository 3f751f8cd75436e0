//! Scripted in-memory portal for tests
//!
//! Every session returned by `MockPortal::login` shares the portal's script
//! and counters, so tests can change the script between polls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use super::{PortalClient, PortalSession};
use crate::domain::{BookingConfirmation, Credentials, Doctor, LockHandle, ServiceVariant, Term, TermsForDay};
use crate::error::{Result, SlotwatchError};

/// Failure a scripted call should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    Auth,
    Portal(u16),
    Booking,
}

impl MockFailure {
    fn to_error(self, call: &str) -> SlotwatchError {
        match self {
            MockFailure::RateLimited => SlotwatchError::RateLimited(call.to_string()),
            MockFailure::Auth => SlotwatchError::Auth(format!("{} rejected", call)),
            MockFailure::Portal(status) => SlotwatchError::Portal {
                status,
                message: call.to_string(),
            },
            MockFailure::Booking => SlotwatchError::Booking(format!("{} refused", call)),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    variants: Vec<ServiceVariant>,
    doctors: Vec<Doctor>,
    searches: VecDeque<Vec<TermsForDay>>,
    login_failures: VecDeque<MockFailure>,
    search_failures: VecDeque<MockFailure>,
    lock_failure: Option<MockFailure>,
    book_failure: Option<MockFailure>,
    search_windows: Vec<(NaiveDate, NaiveDate)>,
}

#[derive(Debug, Default)]
struct Counters {
    logins: AtomicUsize,
    searches: AtomicUsize,
    locks: AtomicUsize,
    books: AtomicUsize,
}

#[derive(Debug, Default)]
struct Shared {
    script: Mutex<Script>,
    counters: Counters,
}

/// Mock portal with a scripted catalog and search results
#[derive(Debug, Clone, Default)]
pub struct MockPortal {
    shared: Arc<Shared>,
}

impl MockPortal {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.shared
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add a catalog entry
    pub fn with_variant(self, id: i64, name: &str) -> Self {
        self.script().variants.push(ServiceVariant {
            id,
            name: name.to_string(),
        });
        self
    }

    /// Add a doctor offered for every variant
    pub fn with_doctor(self, id: i64, first_name: &str, last_name: &str) -> Self {
        self.script().doctors.push(Doctor {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        });
        self
    }

    /// Queue the result of the next search call; empty once the queue drains
    pub fn push_search(&self, days: Vec<TermsForDay>) {
        self.script().searches.push_back(days);
    }

    /// Queue a failure for the next login
    pub fn fail_next_login(&self, failure: MockFailure) {
        self.script().login_failures.push_back(failure);
    }

    /// Queue a failure for the next search
    pub fn fail_next_search(&self, failure: MockFailure) {
        self.script().search_failures.push_back(failure);
    }

    pub fn fail_lock(&self, failure: MockFailure) {
        self.script().lock_failure = Some(failure);
    }

    pub fn fail_book(&self, failure: MockFailure) {
        self.script().book_failure = Some(failure);
    }

    pub fn login_count(&self) -> usize {
        self.shared.counters.logins.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.shared.counters.searches.load(Ordering::SeqCst)
    }

    pub fn lock_count(&self) -> usize {
        self.shared.counters.locks.load(Ordering::SeqCst)
    }

    pub fn book_count(&self) -> usize {
        self.shared.counters.books.load(Ordering::SeqCst)
    }

    /// Date windows passed to search, in call order
    pub fn search_windows(&self) -> Vec<(NaiveDate, NaiveDate)> {
        self.script().search_windows.clone()
    }
}

#[async_trait]
impl PortalClient for MockPortal {
    async fn login(&self, _credentials: &Credentials) -> Result<Box<dyn PortalSession>> {
        self.shared.counters.logins.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.script().login_failures.pop_front() {
            return Err(failure.to_error("login"));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl PortalSession for MockPortal {
    async fn find_variant(&self, service: &str) -> Result<Option<ServiceVariant>> {
        let wanted = service.to_lowercase();
        Ok(self
            .script()
            .variants
            .iter()
            .find(|v| v.name.to_lowercase() == wanted)
            .cloned())
    }

    async fn find_doctor(&self, _variant_id: i64, first_name: &str, last_name: &str) -> Result<Option<Doctor>> {
        Ok(self
            .script()
            .doctors
            .iter()
            .find(|d| d.is_named(first_name, last_name))
            .cloned())
    }

    async fn search_terms(
        &self,
        _variant: &ServiceVariant,
        doctor_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TermsForDay>> {
        self.shared.counters.searches.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script();
        script.search_windows.push((from, to));
        if let Some(failure) = script.search_failures.pop_front() {
            return Err(failure.to_error("search"));
        }
        let days = script.searches.pop_front().unwrap_or_default();
        Ok(match doctor_id {
            Some(id) => days
                .into_iter()
                .filter(|d| d.terms.iter().any(|t| t.doctor.id == id))
                .collect(),
            None => days,
        })
    }

    async fn lock_term(&self, term: &Term, _variant: &ServiceVariant) -> Result<LockHandle> {
        self.shared.counters.locks.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.script().lock_failure {
            return Err(failure.to_error("lock"));
        }
        Ok(LockHandle {
            temporary_reservation_id: term.schedule_id,
            valuations: Vec::new(),
        })
    }

    async fn book(&self, lock: &LockHandle, _term: &Term, _variant: &ServiceVariant) -> Result<BookingConfirmation> {
        self.shared.counters.books.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.script().book_failure {
            return Err(failure.to_error("book"));
        }
        Ok(BookingConfirmation {
            reservation_id: Some(lock.temporary_reservation_id),
        })
    }
}

/// A slot starting at `start`, fifteen minutes long
pub fn term_at(start: NaiveDateTime, is_telemedicine: bool) -> Term {
    Term {
        clinic: "Centrum".to_string(),
        doctor: Doctor {
            id: 1,
            first_name: "Jan".to_string(),
            last_name: "Kowalski".to_string(),
        },
        clinic_id: 1,
        room_id: 1,
        schedule_id: start.and_utc().timestamp(),
        service_id: 1,
        date_time_from: start,
        date_time_to: start + chrono::Duration::minutes(15),
        is_telemedicine,
    }
}

/// Group slots into a single search-result day
pub fn day_of(terms: Vec<Term>) -> TermsForDay {
    let day = terms
        .first()
        .map(|t| t.date_time_from.date())
        .unwrap_or_default()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    TermsForDay { day, terms }
}
