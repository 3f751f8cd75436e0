//! Booking decision engine
//!
//! One `evaluate` call performs variant lookup, slot search, filtering, the
//! auto-book check and exactly one side effect (one email, or one lock+book
//! followed by one email), then classifies the result.

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use tokio_util::sync::CancellationToken;

use super::decider::{AutoBookRule, SearchWindow};
use crate::domain::{BookingConfirmation, Outcome, ServiceVariant, Term, TermsForDay, WatchRequest};
use crate::error::{Result, SlotwatchError};
use crate::notify::Notifier;
use crate::portal::PortalSession;

/// Abort at a suspension point once the watch has been cancelled
fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(SlotwatchError::Cancelled);
    }
    Ok(())
}

pub struct BookingEngine {
    notifier: Arc<dyn Notifier>,
    rule: AutoBookRule,
    window: SearchWindow,
}

impl BookingEngine {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            rule: AutoBookRule::default(),
            window: SearchWindow::default(),
        }
    }

    pub fn with_rule(mut self, rule: AutoBookRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_window(mut self, window: SearchWindow) -> Self {
        self.window = window;
        self
    }

    /// Evaluate a request against the portal as of now (portal local time)
    pub async fn evaluate(
        &self,
        session: &dyn PortalSession,
        request: &WatchRequest,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        self.evaluate_at(session, request, cancel, Local::now().naive_local())
            .await
    }

    pub async fn evaluate_at(
        &self,
        session: &dyn PortalSession,
        request: &WatchRequest,
        cancel: &CancellationToken,
        now: NaiveDateTime,
    ) -> Result<Outcome> {
        checkpoint(cancel)?;
        let Some(variant) = session.find_variant(&request.service).await? else {
            log::warn!("Service {} not found for request {}", request.service, request.id);
            return Ok(Outcome::VariantNotFound);
        };

        let doctor_id = request.doctor.as_ref().map(|d| d.id);
        let days = self
            .search(session, &variant, doctor_id, now.date(), cancel)
            .await?;

        let terms: Vec<&Term> = days
            .iter()
            .flat_map(|d| d.terms.iter())
            .filter(|t| !t.is_telemedicine)
            .collect();
        if terms.is_empty() {
            log::info!("No available visits for service {} (request {})", request.service, request.id);
            return Ok(Outcome::NoAppointmentsFound);
        }

        checkpoint(cancel)?;
        if request.auto_book {
            if let Some(term) = self.rule.select(terms.iter().copied(), now) {
                return self.book_and_notify(session, request, &variant, term).await;
            }
        }

        self.notify_availability(request).await;
        Ok(Outcome::EmailSent)
    }

    /// First window, then the following one only if the first is empty
    async fn search(
        &self,
        session: &dyn PortalSession,
        variant: &ServiceVariant,
        doctor_id: Option<i64>,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<Vec<TermsForDay>> {
        checkpoint(cancel)?;
        let (from, to) = self.window.first(today);
        let first = session.search_terms(variant, doctor_id, from, to).await?;
        if !first.is_empty() {
            return Ok(first);
        }

        checkpoint(cancel)?;
        let (from, to) = self.window.second(today);
        session.search_terms(variant, doctor_id, from, to).await
    }

    async fn book_and_notify(
        &self,
        session: &dyn PortalSession,
        request: &WatchRequest,
        variant: &ServiceVariant,
        term: &Term,
    ) -> Result<Outcome> {
        match book_on_behalf(session, variant, term).await {
            Ok(confirmation) => {
                log::info!(
                    "Booked {} at {} for request {} (reservation {:?})",
                    request.service,
                    term.date_time_from,
                    request.id,
                    confirmation.reservation_id
                );
                if let Err(e) = self.notifier.send_booked_on_behalf(request).await {
                    log::warn!("Failed to send booking email for request {}: {}", request.id, e);
                }
                Ok(Outcome::BookedOnBehalf)
            }
            Err(e) if e.is_rate_limited() => Err(e),
            Err(e) => {
                log::warn!("Booking on behalf failed for request {}: {}", request.id, e);
                self.notify_availability(request).await;
                Ok(Outcome::BookOnBehalfFailedEmailSent)
            }
        }
    }

    async fn notify_availability(&self, request: &WatchRequest) {
        if let Err(e) = self.notifier.send_availability(request).await {
            log::warn!("Failed to send availability email for request {}: {}", request.id, e);
        }
    }
}

/// Lock then book; neither call is retried here
async fn book_on_behalf(
    session: &dyn PortalSession,
    variant: &ServiceVariant,
    term: &Term,
) -> Result<BookingConfirmation> {
    let lock = session.lock_term(term, variant).await?;
    session.book(&lock, term, variant).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Credentials;
    use crate::notify::{RecordingNotifier, Sent};
    use crate::portal::mock::{MockFailure, MockPortal, day_of, term_at};
    use chrono::Duration;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-06-01 12:00", "%Y-%m-%d %H:%M").unwrap()
    }

    fn request(service: &str) -> WatchRequest {
        WatchRequest::new(Credentials::new("jan", "pw"), service, "jan@example.com")
    }

    fn setup() -> (MockPortal, Arc<RecordingNotifier>, BookingEngine) {
        let portal = MockPortal::new().with_variant(10, "Cardiology");
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = BookingEngine::new(notifier.clone());
        (portal, notifier, engine)
    }

    #[tokio::test]
    async fn test_variant_not_found() {
        let (portal, notifier, engine) = setup();
        let outcome = engine
            .evaluate_at(&portal, &request("zzz-none"), &CancellationToken::new(), now())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::VariantNotFound);
        assert_eq!(portal.search_count(), 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_no_appointments_searches_both_windows() {
        let (portal, notifier, engine) = setup();
        let outcome = engine
            .evaluate_at(&portal, &request("cardiology"), &CancellationToken::new(), now())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::NoAppointmentsFound);

        let windows = portal.search_windows();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].0, now().date());
        assert_eq!(windows[1].0, windows[0].1);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_second_window_skipped_when_first_has_results() {
        let (portal, _notifier, engine) = setup();
        portal.push_search(vec![day_of(vec![term_at(now() + Duration::hours(2), false)])]);
        engine
            .evaluate_at(&portal, &request("Cardiology"), &CancellationToken::new(), now())
            .await
            .unwrap();
        assert_eq!(portal.search_count(), 1);
    }

    #[tokio::test]
    async fn test_telemedicine_only_counts_as_empty() {
        let (portal, notifier, engine) = setup();
        portal.push_search(vec![day_of(vec![term_at(now() + Duration::days(2), true)])]);
        let outcome = engine
            .evaluate_at(&portal, &request("Cardiology"), &CancellationToken::new(), now())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::NoAppointmentsFound);
        assert_eq!(portal.lock_count(), 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_slot_20_hours_out_is_booked() {
        let (portal, notifier, engine) = setup();
        let req = request("Cardiology");
        portal.push_search(vec![day_of(vec![term_at(now() + Duration::hours(20), false)])]);

        let outcome = engine
            .evaluate_at(&portal, &req, &CancellationToken::new(), now())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::BookedOnBehalf);
        assert_eq!(portal.lock_count(), 1);
        assert_eq!(portal.book_count(), 1);
        assert_eq!(notifier.sent(), vec![Sent::BookedOnBehalf { request_id: req.id }]);
    }

    #[tokio::test]
    async fn test_slot_10_hours_out_sends_email() {
        let (portal, notifier, engine) = setup();
        let req = request("Cardiology");
        portal.push_search(vec![day_of(vec![term_at(now() + Duration::hours(10), false)])]);

        let outcome = engine
            .evaluate_at(&portal, &req, &CancellationToken::new(), now())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::EmailSent);
        assert_eq!(portal.lock_count(), 0);
        assert_eq!(notifier.sent(), vec![Sent::Availability { request_id: req.id }]);
    }

    #[tokio::test]
    async fn test_auto_book_disabled_skips_qualification() {
        let (portal, notifier, engine) = setup();
        let req = request("Cardiology").with_auto_book(false);
        portal.push_search(vec![day_of(vec![term_at(now() + Duration::hours(48), false)])]);

        let outcome = engine
            .evaluate_at(&portal, &req, &CancellationToken::new(), now())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::EmailSent);
        assert_eq!(portal.lock_count(), 0);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_lock_failure_falls_back_to_email() {
        let (portal, notifier, engine) = setup();
        let req = request("Cardiology");
        portal.fail_lock(MockFailure::Portal(500));
        portal.push_search(vec![day_of(vec![term_at(now() + Duration::hours(20), false)])]);

        let outcome = engine
            .evaluate_at(&portal, &req, &CancellationToken::new(), now())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::BookOnBehalfFailedEmailSent);
        assert_eq!(portal.book_count(), 0);
        assert_eq!(notifier.sent(), vec![Sent::Availability { request_id: req.id }]);
    }

    #[tokio::test]
    async fn test_book_failure_falls_back_to_email() {
        let (portal, notifier, engine) = setup();
        portal.fail_book(MockFailure::Booking);
        portal.push_search(vec![day_of(vec![term_at(now() + Duration::hours(20), false)])]);

        let outcome = engine
            .evaluate_at(&portal, &request("Cardiology"), &CancellationToken::new(), now())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::BookOnBehalfFailedEmailSent);
        assert_eq!(portal.lock_count(), 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_lock_propagates() {
        let (portal, notifier, engine) = setup();
        portal.fail_lock(MockFailure::RateLimited);
        portal.push_search(vec![day_of(vec![term_at(now() + Duration::hours(20), false)])]);

        let result = engine
            .evaluate_at(&portal, &request("Cardiology"), &CancellationToken::new(), now())
            .await;

        assert!(matches!(result, Err(SlotwatchError::RateLimited(_))));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_search_propagates() {
        let (portal, _notifier, engine) = setup();
        portal.fail_next_search(MockFailure::RateLimited);

        let result = engine
            .evaluate_at(&portal, &request("Cardiology"), &CancellationToken::new(), now())
            .await;
        assert!(result.unwrap_err().is_rate_limited());
    }

    #[tokio::test]
    async fn test_first_qualifying_slot_is_booked_not_earliest() {
        let (portal, _notifier, engine) = setup();
        let later = term_at(now() + Duration::days(6), false);
        let sooner = term_at(now() + Duration::days(1), false);
        portal.push_search(vec![day_of(vec![later]), day_of(vec![sooner])]);

        let outcome = engine
            .evaluate_at(&portal, &request("Cardiology"), &CancellationToken::new(), now())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::BookedOnBehalf);
        assert_eq!(portal.lock_count(), 1);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_change_outcome() {
        let portal = MockPortal::new().with_variant(10, "Cardiology");
        let notifier = Arc::new(RecordingNotifier::new().failing());
        let engine = BookingEngine::new(notifier.clone());
        portal.push_search(vec![day_of(vec![term_at(now() + Duration::hours(3), false)])]);

        let outcome = engine
            .evaluate_at(&portal, &request("Cardiology"), &CancellationToken::new(), now())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::EmailSent);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (portal, notifier, engine) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine
            .evaluate_at(&portal, &request("Cardiology"), &cancel, now())
            .await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(portal.search_count(), 0);
        assert!(notifier.sent().is_empty());
    }
}
