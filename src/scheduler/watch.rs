//! Watch scheduler: one polling loop per request id.
//!
//! Each entry runs an explicit loop:
//! 1. Wait for the current delay (skipped when zero; cancellable)
//! 2. Run the action
//! 3. Rate limited: grow the delay and go back to 1
//! 4. Anything else: retire the entry
//!
//! An entry stays in the registry until its own loop exits, so `start` for
//! an id whose poll is still in flight is a no-op even after `cancel`. The
//! registry lock is never held across an await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffPolicy;
use crate::domain::{Outcome, WatchRequest};
use crate::error::{Result, SlotwatchError};
use crate::notify::Notifier;
use crate::store::RequestStore;

/// One poll of a request. Receives the entry's cancellation token and must
/// check it at its own suspension points.
pub type WatchAction = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<Outcome>> + Send + Sync>;

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub policy: BackoffPolicy,
    /// Park resolved requests instead of dropping them
    pub hibernate_resolved: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: BackoffPolicy::default(),
            hibernate_resolved: true,
        }
    }
}

/// Phase of a live entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Suspended before the next poll
    Waiting(Duration),
    /// Action in flight
    Running,
    /// Cancelled; the entry goes away once its in-flight poll returns
    Cancelled,
}

/// How a watch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    Terminated(Outcome),
    Cancelled,
    Failed,
}

/// Read-only view of an entry
#[derive(Debug, Clone)]
pub struct WatchSnapshot {
    pub id: String,
    pub request: WatchRequest,
    pub started_at: DateTime<Utc>,
    pub delay: Duration,
    pub state: WatchState,
}

struct WatchEntry {
    request: WatchRequest,
    started_at: DateTime<Utc>,
    delay: Duration,
    state: WatchState,
    cancel: CancellationToken,
    action: WatchAction,
    /// Distinguishes this entry from a later one for the same id
    generation: u64,
    /// Start a fresh entry once this one's loop exits
    restart_pending: bool,
}

impl WatchEntry {
    fn cancel(&mut self) {
        self.state = WatchState::Cancelled;
        self.cancel.cancel();
    }
}

struct Inner {
    entries: Mutex<HashMap<String, WatchEntry>>,
    /// Last error reported per request id, so a persistent fault is reported once
    reported: Mutex<HashMap<String, String>>,
    store: Arc<RequestStore>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    next_generation: AtomicU64,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, WatchEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reported(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.reported.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a fresh entry and spawn its loop. Caller holds the lock.
    fn spawn_entry(
        self: &Arc<Self>,
        entries: &mut HashMap<String, WatchEntry>,
        request: WatchRequest,
        action: WatchAction,
    ) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        entries.insert(
            request.id.clone(),
            WatchEntry {
                request: request.clone(),
                started_at: Utc::now(),
                delay: Duration::ZERO,
                state: WatchState::Waiting(Duration::ZERO),
                cancel: cancel.clone(),
                action: action.clone(),
                generation,
                restart_pending: false,
            },
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let id = request.id.clone();
            let exit = inner.run_watch(request, action, cancel, generation).await;
            tracing::debug!(request_id = %id, exit = ?exit, "Watch loop ended");
            inner.finish(&id, generation, exit);
        });
    }

    /// Mutate the entry only if it is still the one this loop owns
    fn update(&self, id: &str, generation: u64, f: impl FnOnce(&mut WatchEntry)) {
        if let Some(entry) = self.entries().get_mut(id) {
            if entry.generation == generation {
                f(entry);
            }
        }
    }

    fn is_current(&self, id: &str, generation: u64) -> bool {
        self.entries().get(id).is_some_and(|e| e.generation == generation)
    }

    /// Move to Running unless cancelled or replaced. Checked under the
    /// registry lock so `restart` never replaces an entry mid-poll.
    fn begin_poll(&self, id: &str, generation: u64) -> bool {
        match self.entries().get_mut(id) {
            Some(entry) if entry.generation == generation && !entry.cancel.is_cancelled() => {
                entry.state = WatchState::Running;
                true
            }
            _ => false,
        }
    }

    /// Drop the loop's own entry; start its replacement if a restart was
    /// requested while it was polling and the request is still unresolved.
    fn finish(self: &Arc<Self>, id: &str, generation: u64, exit: WatchExit) {
        let mut entries = self.entries();
        if !entries.get(id).is_some_and(|e| e.generation == generation) {
            return;
        }
        let Some(entry) = entries.remove(id) else {
            return;
        };
        let resolved = matches!(exit, WatchExit::Terminated(outcome) if outcome.is_terminal());
        if entry.restart_pending && !resolved {
            tracing::info!(request_id = %id, "Starting deferred restart");
            self.spawn_entry(&mut entries, entry.request, entry.action);
        }
    }

    /// Take a resolved request out of the active set
    fn retire(&self, request: &WatchRequest) {
        if self.config.hibernate_resolved {
            self.store.hibernate(request);
        } else {
            self.store.remove(request);
        }
    }

    async fn report(&self, request: &WatchRequest, error: &SlotwatchError) {
        if let Err(e) = self.notifier.send_error(request, error).await {
            tracing::warn!(request_id = %request.id, error = %e, "Failed to send error notification");
        }
    }

    /// Report a failure unless the same one was already reported for this request
    async fn report_once(&self, request: &WatchRequest, error: &SlotwatchError) {
        let message = error.to_string();
        let repeated = self.reported().insert(request.id.clone(), message.clone()) == Some(message);
        if repeated {
            tracing::debug!(request_id = %request.id, "Error already reported");
            return;
        }
        self.report(request, error).await;
    }

    async fn run_watch(
        &self,
        request: WatchRequest,
        action: WatchAction,
        cancel: CancellationToken,
        generation: u64,
    ) -> WatchExit {
        let id = request.id.as_str();
        let mut delay = Duration::ZERO;

        loop {
            if !delay.is_zero() {
                self.update(id, generation, |e| e.state = WatchState::Waiting(delay));
                tokio::select! {
                    _ = cancel.cancelled() => return WatchExit::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if !self.begin_poll(id, generation) {
                return WatchExit::Cancelled;
            }

            match action(cancel.clone()).await {
                Ok(outcome) => {
                    tracing::info!(request_id = %id, outcome = %outcome, "Watch poll finished");
                    self.reported().remove(id);
                    // Side effects of a terminal outcome have committed even if
                    // the watch was cancelled meanwhile.
                    if outcome.is_terminal() && self.is_current(id, generation) {
                        self.retire(&request);
                    }
                    return WatchExit::Terminated(outcome);
                }
                Err(e) if e.is_cancelled() => return WatchExit::Cancelled,
                Err(e) if e.is_rate_limited() => {
                    if cancel.is_cancelled() {
                        return WatchExit::Cancelled;
                    }
                    let decision = self.config.policy.next_delay(delay, true);
                    delay = decision.delay;
                    self.update(id, generation, |e| {
                        e.delay = delay;
                        e.state = WatchState::Waiting(delay);
                    });
                    tracing::warn!(
                        request_id = %id,
                        delay_secs = delay.as_secs(),
                        "Rate limited, rescheduling watch"
                    );
                    if decision.escalate {
                        tracing::error!(request_id = %id, delay_secs = delay.as_secs(), "Backoff past ceiling");
                        self.report(&request, &e).await;
                    }
                }
                Err(e) => {
                    tracing::error!(request_id = %id, error = %e, "Watch failed");
                    if !cancel.is_cancelled() {
                        self.report_once(&request, &e).await;
                    }
                    return WatchExit::Failed;
                }
            }
        }
    }
}

/// Registry of running watches. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct WatchScheduler {
    inner: Arc<Inner>,
}

impl WatchScheduler {
    pub fn new(store: Arc<RequestStore>, notifier: Arc<dyn Notifier>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                reported: Mutex::new(HashMap::new()),
                store,
                notifier,
                config,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Start watching `request`. No-op (returns false) if an entry for its id
    /// already exists, including one that is cancelled but still polling.
    /// Must be called inside a tokio runtime.
    pub fn start(&self, request: WatchRequest, action: WatchAction) -> bool {
        let mut entries = self.inner.entries();
        if entries.contains_key(&request.id) {
            tracing::debug!(request_id = %request.id, "Watch already running");
            return false;
        }
        tracing::debug!(request_id = %request.id, service = %request.service, "Starting watch");
        self.inner.spawn_entry(&mut entries, request, action);
        true
    }

    /// Cancel the entry for `id`. The entry is removed by its loop once it
    /// observes the cancellation.
    pub fn cancel(&self, id: &str) -> bool {
        let mut entries = self.inner.entries();
        match entries.get_mut(id) {
            Some(entry) if entry.state != WatchState::Cancelled || entry.restart_pending => {
                entry.restart_pending = false;
                entry.cancel();
                tracing::info!(request_id = %id, "Watch cancelled");
                true
            }
            _ => false,
        }
    }

    /// Start the watch for `id` afresh with its delay reset to zero. A waiting
    /// entry is replaced at once; a polling one is replaced when its poll returns.
    pub fn restart(&self, id: &str) -> bool {
        let mut entries = self.inner.entries();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        match entry.state {
            WatchState::Waiting(_) => {
                entry.cancel();
                let request = entry.request.clone();
                let action = Arc::clone(&entry.action);
                tracing::info!(request_id = %id, "Watch restarted");
                self.inner.spawn_entry(&mut entries, request, action);
            }
            WatchState::Running | WatchState::Cancelled => {
                entry.restart_pending = true;
                entry.cancel();
                tracing::info!(request_id = %id, "Watch restart deferred until poll returns");
            }
        }
        true
    }

    pub fn list(&self) -> Vec<WatchSnapshot> {
        self.inner
            .entries()
            .iter()
            .map(|(id, e)| WatchSnapshot {
                id: id.clone(),
                request: e.request.clone(),
                started_at: e.started_at,
                delay: e.delay,
                state: e.state,
            })
            .collect()
    }

    pub fn is_watching(&self, id: &str) -> bool {
        self.inner.entries().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Credentials;
    use crate::notify::RecordingNotifier;
    use futures::FutureExt;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    struct Scripted {
        results: Mutex<VecDeque<Result<Outcome>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(results: Vec<Result<Outcome>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn action(self: &Arc<Self>) -> WatchAction {
            let script = Arc::clone(self);
            Arc::new(move |_cancel: CancellationToken| {
                let script = Arc::clone(&script);
                async move {
                    script.calls.fetch_add(1, Ordering::SeqCst);
                    let next = script.results.lock().unwrap().pop_front();
                    next.unwrap_or(Ok(Outcome::NoAppointmentsFound))
                }
                .boxed()
            })
        }
    }

    /// Takes ten seconds and ignores cancellation, like an in-flight booking call
    struct Slow {
        outcome: fn() -> Result<Outcome>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Slow {
        fn new(outcome: fn() -> Result<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn action(self: &Arc<Self>) -> WatchAction {
            let slow = Arc::clone(self);
            Arc::new(move |_cancel: CancellationToken| {
                let slow = Arc::clone(&slow);
                async move {
                    slow.calls.fetch_add(1, Ordering::SeqCst);
                    let running = slow.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    slow.max_in_flight.fetch_max(running, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    slow.in_flight.fetch_sub(1, Ordering::SeqCst);
                    (slow.outcome)()
                }
                .boxed()
            })
        }
    }

    fn rate_limited() -> Result<Outcome> {
        Err(SlotwatchError::RateLimited("429".to_string()))
    }

    fn setup(config: SchedulerConfig) -> (WatchScheduler, Arc<RequestStore>, Arc<RecordingNotifier>, WatchRequest) {
        let store = Arc::new(RequestStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = WatchScheduler::new(store.clone(), notifier.clone(), config);
        let request = WatchRequest::new(Credentials::new("jan", "pw"), "Cardiology", "jan@example.com");
        store.add(request.clone());
        (scheduler, store, notifier, request)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_noop_for_existing_id() {
        let (scheduler, _store, _notifier, request) = setup(SchedulerConfig::default());
        let script = Scripted::new(vec![rate_limited()]);

        assert!(scheduler.start(request.clone(), script.action()));
        assert!(!scheduler.start(request.clone(), script.action()));
        settle().await;

        assert!(!scheduler.start(request.clone(), script.action()));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_outcome_hibernates_request() {
        let (scheduler, store, _notifier, request) = setup(SchedulerConfig::default());
        let script = Scripted::new(vec![Ok(Outcome::EmailSent)]);

        scheduler.start(request.clone(), script.action());
        settle().await;

        assert!(scheduler.is_empty());
        assert_eq!(store.active_count(), 0);
        assert_eq!(store.hibernated_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_outcome_removes_request_without_hibernation() {
        let config = SchedulerConfig {
            hibernate_resolved: false,
            ..SchedulerConfig::default()
        };
        let (scheduler, store, _notifier, request) = setup(config);
        let script = Scripted::new(vec![Ok(Outcome::BookedOnBehalf)]);

        scheduler.start(request, script.action());
        settle().await;

        assert_eq!(store.active_count(), 0);
        assert_eq!(store.hibernated_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_outcome_keeps_request_active() {
        let (scheduler, store, _notifier, request) = setup(SchedulerConfig::default());
        let script = Scripted::new(vec![Ok(Outcome::NoAppointmentsFound)]);

        scheduler.start(request.clone(), script.action());
        settle().await;

        assert!(!scheduler.is_watching(&request.id));
        assert_eq!(store.list_active(), vec![request]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_reschedules_with_doubling_delay() {
        let (scheduler, store, _notifier, request) = setup(SchedulerConfig::default());
        let script = Scripted::new(vec![rate_limited(), rate_limited(), Ok(Outcome::EmailSent)]);

        scheduler.start(request.clone(), script.action());
        settle().await;
        let snapshot = scheduler.list().remove(0);
        assert_eq!(snapshot.delay, Duration::from_secs(60));
        assert_eq!(snapshot.state, WatchState::Waiting(Duration::from_secs(60)));
        assert_eq!(script.calls(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(script.calls(), 2);
        assert_eq!(scheduler.list()[0].delay, Duration::from_secs(120));

        tokio::time::sleep(Duration::from_secs(121)).await;
        settle().await;
        assert_eq!(script.calls(), 3);
        assert!(scheduler.is_empty());
        assert_eq!(store.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_loop() {
        let (scheduler, store, _notifier, request) = setup(SchedulerConfig::default());
        let script = Scripted::new(vec![rate_limited(), Ok(Outcome::EmailSent)]);

        scheduler.start(request.clone(), script.action());
        settle().await;
        assert!(scheduler.cancel(&request.id));
        assert!(!scheduler.cancel(&request.id));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        settle().await;
        assert_eq!(script.calls(), 1);
        assert!(scheduler.is_empty());
        assert_eq!(store.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_delay() {
        let (scheduler, _store, _notifier, request) = setup(SchedulerConfig::default());
        let script = Scripted::new(vec![rate_limited(), rate_limited()]);

        scheduler.start(request.clone(), script.action());
        settle().await;
        assert_eq!(scheduler.list()[0].delay, Duration::from_secs(60));

        assert!(scheduler.restart(&request.id));
        let fresh = scheduler.list().remove(0);
        assert_eq!(fresh.delay, Duration::ZERO);
        settle().await;

        // Fresh entry polls immediately and starts its own backoff from scratch
        assert_eq!(script.calls(), 2);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.list()[0].delay, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_unknown_id() {
        let (scheduler, _store, _notifier, _request) = setup(SchedulerConfig::default());
        assert!(!scheduler.restart("req-missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_notifies_without_cancelling() {
        let config = SchedulerConfig {
            policy: BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(3)),
            hibernate_resolved: true,
        };
        let (scheduler, _store, notifier, request) = setup(config);
        let script = Scripted::new(vec![rate_limited(), rate_limited(), rate_limited()]);

        scheduler.start(request.clone(), script.action());
        // Delays 1s, 2s, then 4s which is past the ceiling
        tokio::time::sleep(Duration::from_secs(4)).await;
        settle().await;

        assert_eq!(script.calls(), 3);
        assert_eq!(notifier.errors().len(), 1);
        assert!(scheduler.is_watching(&request.id));
        assert_eq!(scheduler.list()[0].delay, Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_error_reports_and_terminates() {
        let (scheduler, store, notifier, request) = setup(SchedulerConfig::default());
        let script = Scripted::new(vec![Err(SlotwatchError::Auth("bad password".to_string()))]);

        scheduler.start(request.clone(), script.action());
        settle().await;

        assert!(scheduler.is_empty());
        assert_eq!(notifier.errors().len(), 1);
        assert_eq!(store.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_tracks_each_request() {
        let (scheduler, store, _notifier, first) = setup(SchedulerConfig::default());
        let second = WatchRequest::new(Credentials::new("ola", "pw"), "Dermatology", "ola@example.com");
        store.add(second.clone());
        let script = Scripted::new(vec![rate_limited(), rate_limited()]);

        scheduler.start(first.clone(), script.action());
        scheduler.start(second.clone(), script.action());
        settle().await;

        let mut ids: Vec<String> = scheduler.list().into_iter().map(|s| s.id).collect();
        ids.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_running_keeps_entry_until_poll_returns() {
        let (scheduler, store, _notifier, request) = setup(SchedulerConfig::default());
        let slow = Slow::new(|| Ok(Outcome::EmailSent));

        assert!(scheduler.start(request.clone(), slow.action()));
        settle().await;
        assert_eq!(scheduler.list()[0].state, WatchState::Running);

        assert!(scheduler.cancel(&request.id));
        assert_eq!(scheduler.list()[0].state, WatchState::Cancelled);
        assert!(!scheduler.start(request.clone(), slow.action()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;

        assert_eq!(slow.calls(), 1);
        assert_eq!(slow.max_in_flight(), 1);
        assert!(scheduler.is_empty());
        // The email went out before the cancellation was observed
        assert_eq!(store.hibernated_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_while_running_waits_for_poll() {
        let (scheduler, _store, _notifier, request) = setup(SchedulerConfig::default());
        let slow = Slow::new(|| Ok(Outcome::NoAppointmentsFound));

        scheduler.start(request.clone(), slow.action());
        settle().await;
        assert!(scheduler.restart(&request.id));
        assert_eq!(scheduler.len(), 1);
        assert!(!scheduler.start(request.clone(), slow.action()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;
        assert_eq!(slow.calls(), 2);
        assert_eq!(slow.max_in_flight(), 1);
        assert_eq!(scheduler.list()[0].state, WatchState::Running);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_dropped_when_poll_resolves_request() {
        let (scheduler, store, _notifier, request) = setup(SchedulerConfig::default());
        let slow = Slow::new(|| Ok(Outcome::BookedOnBehalf));

        scheduler.start(request.clone(), slow.action());
        settle().await;
        assert!(scheduler.restart(&request.id));

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(slow.calls(), 1);
        assert!(scheduler.is_empty());
        assert_eq!(store.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_rate_limited_poll_skips_escalation() {
        let config = SchedulerConfig {
            policy: BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(1)),
            hibernate_resolved: true,
        };
        let (scheduler, _store, notifier, request) = setup(config);
        let slow = Slow::new(rate_limited);

        scheduler.start(request.clone(), slow.action());
        settle().await;
        scheduler.cancel(&request.id);

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(slow.calls(), 1);
        assert!(notifier.errors().is_empty());
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failure_reported_once() {
        let (scheduler, _store, notifier, request) = setup(SchedulerConfig::default());
        let auth = || Err(SlotwatchError::Auth("bad password".to_string()));
        let script = Scripted::new(vec![
            auth(),
            auth(),
            Err(SlotwatchError::Portal {
                status: 500,
                message: "terms".to_string(),
            }),
            Ok(Outcome::NoAppointmentsFound),
            auth(),
        ]);

        for _ in 0..5 {
            assert!(scheduler.start(request.clone(), script.action()));
            settle().await;
        }

        assert_eq!(script.calls(), 5);
        // Auth, then the portal error, then auth again after a clean poll
        assert_eq!(notifier.errors().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_create_one_entry() {
        let (scheduler, _store, _notifier, request) = setup(SchedulerConfig::default());
        let script = Scripted::new((0..16).map(|_| rate_limited()).collect());
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let scheduler = scheduler.clone();
                let request = request.clone();
                let action = script.action();
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    scheduler.start(request, action)
                })
            })
            .collect();

        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(scheduler.len(), 1);
    }
}
