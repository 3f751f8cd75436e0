//! In-memory request store
//!
//! Holds active and hibernated watch requests behind a single mutex. Every
//! operation takes the lock once, so each mutation is atomic with respect to
//! concurrent readers; `list_active` hands out a copy.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::domain::{HibernatedRequest, WatchRequest};

#[derive(Debug, Default)]
struct Inner {
    active: Vec<WatchRequest>,
    hibernated: Vec<HibernatedRequest>,
}

/// Active and hibernated requests, keyed by request id
#[derive(Debug, Default)]
pub struct RequestStore {
    inner: Mutex<Inner>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves both vectors intact, so the
    // poisoned guard is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert into the active set. Duplicate (login, service) pairs are allowed.
    pub fn add(&self, request: WatchRequest) {
        log::debug!("Adding request {} for service {}", request.id, request.service);
        self.lock().active.push(request);
    }

    /// Remove from the active set; no-op if absent
    pub fn remove(&self, request: &WatchRequest) -> bool {
        let mut inner = self.lock();
        let before = inner.active.len();
        inner.active.retain(|r| r.id != request.id);
        before != inner.active.len()
    }

    /// Snapshot of the active set in insertion order
    pub fn list_active(&self) -> Vec<WatchRequest> {
        self.lock().active.clone()
    }

    /// Snapshot of the hibernated set in insertion order
    pub fn list_hibernated(&self) -> Vec<HibernatedRequest> {
        self.lock().hibernated.clone()
    }

    pub fn get(&self, id: &str) -> Option<WatchRequest> {
        self.lock().active.iter().find(|r| r.id == id).cloned()
    }

    /// Move a request from the active set to the hibernated set.
    ///
    /// A previous hibernated entry for the same (login, service) is replaced.
    pub fn hibernate(&self, request: &WatchRequest) {
        let mut inner = self.lock();
        inner.active.retain(|r| r.id != request.id);
        if let Some(pos) = inner.hibernated.iter().position(|h| h.request.same_target(request)) {
            inner.hibernated.remove(pos);
        }
        inner.hibernated.push(HibernatedRequest {
            request: request.clone(),
            hibernated_at: Utc::now(),
        });
        log::info!("Hibernated request {} ({})", request.id, request.service);
    }

    /// Re-arm the first hibernated request matching (login, service).
    ///
    /// Returns false when nothing matches. The watch itself starts on the next
    /// periodic tick.
    pub fn dehibernate(&self, login: &str, service: &str) -> bool {
        let mut inner = self.lock();
        let Some(pos) = inner.hibernated.iter().position(|h| h.request.matches(login, service)) else {
            return false;
        };
        let hibernated = inner.hibernated.remove(pos);
        log::info!(
            "Dehibernated request {} ({})",
            hibernated.request.id,
            hibernated.request.service
        );
        inner.active.push(hibernated.request);
        true
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn hibernated_count(&self) -> usize {
        self.lock().hibernated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Credentials;
    use std::sync::Arc;

    fn request(login: &str, service: &str, email: &str) -> WatchRequest {
        WatchRequest::new(Credentials::new(login, "pw"), service, email)
    }

    #[test]
    fn test_add_and_list_preserves_order() {
        let store = RequestStore::new();
        let a = request("a", "Cardiology", "a@x.pl");
        let b = request("b", "Dermatology", "b@x.pl");
        store.add(a.clone());
        store.add(b.clone());

        let listed = store.list_active();
        assert_eq!(listed, vec![a, b]);
    }

    #[test]
    fn test_duplicate_pairs_allowed_as_distinct_requests() {
        let store = RequestStore::new();
        store.add(request("a", "Cardiology", "one@x.pl"));
        store.add(request("A", "cardiology", "two@x.pl"));
        assert_eq!(store.active_count(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = RequestStore::new();
        let a = request("a", "Cardiology", "a@x.pl");
        store.add(a.clone());

        assert!(store.remove(&a));
        assert!(!store.remove(&a));
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let store = RequestStore::new();
        let a = request("a", "Cardiology", "a@x.pl");
        store.add(a.clone());

        let snapshot = store.list_active();
        store.remove(&a);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_hibernate_moves_out_of_active() {
        let store = RequestStore::new();
        let a = request("a", "Cardiology", "a@x.pl");
        store.add(a.clone());

        store.hibernate(&a);

        assert_eq!(store.active_count(), 0);
        let hibernated = store.list_hibernated();
        assert_eq!(hibernated.len(), 1);
        assert_eq!(hibernated[0].request.id, a.id);
    }

    #[test]
    fn test_hibernate_last_one_wins() {
        let store = RequestStore::new();
        let first = request("jan", "Cardiology", "first@x.pl");
        let second = request("JAN", "CARDIOLOGY", "second@x.pl");
        store.add(first.clone());
        store.add(second.clone());

        store.hibernate(&first);
        store.hibernate(&second);

        let hibernated = store.list_hibernated();
        assert_eq!(hibernated.len(), 1);
        assert_eq!(hibernated[0].request.notification_email, "second@x.pl");
    }

    #[test]
    fn test_dehibernate_then_dehibernate_again() {
        let store = RequestStore::new();
        let a = request("jan", "Cardiology", "a@x.pl");
        store.add(a.clone());
        store.hibernate(&a);

        assert!(store.dehibernate("Jan", "cardiology"));
        let active = store.list_active();
        let matching: Vec<_> = active.iter().filter(|r| r.matches("jan", "cardiology")).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].id, a.id);
        assert_eq!(store.hibernated_count(), 0);

        assert!(!store.dehibernate("jan", "cardiology"));
    }

    #[test]
    fn test_dehibernate_requires_both_fields() {
        let store = RequestStore::new();
        let a = request("jan", "Cardiology", "a@x.pl");
        store.add(a.clone());
        store.hibernate(&a);

        assert!(!store.dehibernate("jan", "Dermatology"));
        assert!(!store.dehibernate("anna", "Cardiology"));
        assert_eq!(store.hibernated_count(), 1);
    }

    #[test]
    fn test_concurrent_add_and_remove() {
        let store = Arc::new(RequestStore::new());
        let requests: Vec<_> = (0..50).map(|i| request(&format!("u{i}"), "S", "x@x.pl")).collect();
        for r in &requests {
            store.add(r.clone());
        }

        let handles: Vec<_> = requests
            .into_iter()
            .map(|r| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let _ = store.list_active();
                    store.remove(&r);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.active_count(), 0);
    }
}
